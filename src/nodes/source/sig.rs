//! Constant-valued signal

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const VALUE: usize = 0;

/// Converts a control value into an audio-rate stream.
///
/// With a scalar or list `value` this is a constant per stream; with a
/// node-valued `value` it is a pass-through, useful for fanning one
/// signal into a differently-shaped patch point.
pub struct Sig {
    value: ParamValue,
    mul: ParamValue,
    add: ParamValue,
}

impl Sig {
    pub fn new(value: impl Into<ParamValue>) -> Self {
        Self {
            value: value.into(),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
        }
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

impl Generator for Sig {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &Inputs,
        _res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let value = inputs.param(VALUE, i);
            for j in 0..buf.len() {
                buf[j] = value.at(j);
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for Sig {
    fn into_def(self) -> NodeDef {
        let value = self.value.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("value", value)
            .mul(mul)
            .add(add)
    }
}
