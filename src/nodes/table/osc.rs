//! Wavetable oscillator

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};
use crate::table::{AddressMode, Interp, Interpolator, TableId};

const FREQ: usize = 0;
const PHASE: usize = 1;

/// Scans a table as one waveform cycle at `freq` Hz.
///
/// Stream `i` reads table channel `i mod chnls`. The table is looked up
/// with wrap addressing, as a wavetable should be.
pub struct Osc {
    table: TableId,
    interp: Interpolator,
    freq: ParamValue,
    phase: ParamValue,
    mul: ParamValue,
    add: ParamValue,
    phases: Vec<f64>,
}

impl Osc {
    pub fn new(table: TableId) -> Self {
        Self {
            table,
            interp: Interpolator::new(Interp::Linear),
            freq: ParamValue::Scalar(440.0),
            phase: ParamValue::Scalar(0.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            phases: Vec::new(),
        }
    }

    pub fn interp(mut self, interp: Interp) -> Self {
        self.interp = Interpolator::new(interp);
        self
    }

    pub fn freq(mut self, freq: impl Into<ParamValue>) -> Self {
        self.freq = freq.into();
        self
    }

    pub fn phase(mut self, phase: impl Into<ParamValue>) -> Self {
        self.phase = phase.into();
        self
    }

    pub fn mul(mut self, mul: impl Into<ParamValue>) -> Self {
        self.mul = mul.into();
        self
    }

    pub fn add(mut self, add: impl Into<ParamValue>) -> Self {
        self.add = add.into();
        self
    }
}

impl Generator for Osc {
    fn prepare(&mut self, _ctx: &ProcessContext, arity: usize) {
        self.phases = vec![0.0; arity];
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let table = res
            .tables
            .get(self.table)
            .ok_or(NodeFault::TableMissing(self.table))?;
        let len = table.len() as f64;
        let sr = ctx.sample_rate as f64;
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let freq = inputs.param(FREQ, i);
            let offset = inputs.param(PHASE, i);
            let mut phase = self.phases[i];
            for j in 0..buf.len() {
                let pos = (phase + offset.at(j) as f64).rem_euclid(1.0) * len;
                buf[j] = table.read(i, pos as f32, &self.interp, AddressMode::Wrap);
                phase += freq.at(j) as f64 / sr;
                phase -= phase.floor();
            }
            self.phases[i] = phase;
        }
        Ok(())
    }
}

impl IntoNodeDef for Osc {
    fn into_def(self) -> NodeDef {
        let freq = self.freq.clone();
        let phase = self.phase.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("freq", freq)
            .param("phase", phase)
            .mul(mul)
            .add(add)
    }
}
