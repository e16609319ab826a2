//! Exponential portamento

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const INPUT: usize = 0;
const RISETIME: usize = 1;
const FALLTIME: usize = 2;

/// Exponential lag toward a target signal, with separate rise and fall
/// times in seconds.
///
/// Useful for:
/// - Smoothing stepped control signals
/// - Portamento/glide between pitches
/// - De-clicking gates
pub struct Port {
    input: ParamValue,
    risetime: ParamValue,
    falltime: ParamValue,
    mul: ParamValue,
    add: ParamValue,
    last: Vec<f32>,
}

impl Port {
    pub fn new(input: impl Into<ParamValue>) -> Self {
        Self {
            input: input.into(),
            risetime: ParamValue::Scalar(0.05),
            falltime: ParamValue::Scalar(0.05),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            last: Vec::new(),
        }
    }

    pub fn risetime(mut self, t: impl Into<ParamValue>) -> Self {
        self.risetime = t.into();
        self
    }

    pub fn falltime(mut self, t: impl Into<ParamValue>) -> Self {
        self.falltime = t.into();
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

impl Generator for Port {
    fn prepare(&mut self, _ctx: &ProcessContext, arity: usize) {
        self.last = vec![0.0; arity];
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
            let input = inputs.param(INPUT, i);
            // Times are block-rate: sampled once at block start.
            let rise = inputs.param(RISETIME, i).first().max(1.0 / sr);
            let fall = inputs.param(FALLTIME, i).first().max(1.0 / sr);
            let rise_coef = (-1.0 / (rise * sr)).exp();
            let fall_coef = (-1.0 / (fall * sr)).exp();
            let mut y = self.last[i];
            for j in 0..buf.len() {
                let x = input.at(j);
                let coef = if x > y { rise_coef } else { fall_coef };
                y = x + (y - x) * coef;
                buf[j] = y;
            }
            self.last[i] = y;
        }
        Ok(())
    }
}

impl IntoNodeDef for Port {
    fn into_def(self) -> NodeDef {
        let input = self.input.clone();
        let risetime = self.risetime.clone();
        let falltime = self.falltime.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("input", input)
            .param("risetime", risetime)
            .param("falltime", falltime)
            .mul(mul)
            .add(add)
    }
}
