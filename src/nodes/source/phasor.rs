//! Linear ramp oscillator

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const FREQ: usize = 0;
const PHASE: usize = 1;

/// A 0..1 sawtooth ramp, the usual index driver for table readers.
pub struct Phasor {
    freq: ParamValue,
    phase: ParamValue,
    mul: ParamValue,
    add: ParamValue,
    phases: Vec<f32>,
}

impl Phasor {
    pub fn new() -> Self {
        Self {
            freq: ParamValue::Scalar(1.0),
            phase: ParamValue::Scalar(0.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            phases: Vec::new(),
        }
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

impl Default for Phasor {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for Phasor {
    fn prepare(&mut self, _ctx: &ProcessContext, arity: usize) {
        self.phases = vec![0.0; arity];
    }

    fn on_play(&mut self) {
        for p in self.phases.iter_mut() {
            *p = 0.0;
        }
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &Inputs,
        _res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let sr = ctx.sample_rate;
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let freq = inputs.param(FREQ, i);
            let offset = inputs.param(PHASE, i);
            let mut phase = self.phases[i];
            for j in 0..buf.len() {
                let v = phase + offset.at(j);
                buf[j] = v - v.floor();
                phase += freq.at(j) / sr;
                phase -= (phase >= 1.0) as u32 as f32;
            }
            self.phases[i] = phase;
        }
        Ok(())
    }
}

impl IntoNodeDef for Phasor {
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
