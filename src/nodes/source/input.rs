//! Physical input reader

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const CHAN: usize = 0;

/// Reads a physical input channel.
///
/// Only meaningful on a duplex server; otherwise it reads silence. A
/// list of channel numbers expands into one stream per entry.
pub struct Input {
    chan: ParamValue,
    mul: ParamValue,
    add: ParamValue,
}

impl Input {
    pub fn new() -> Self {
        Self {
            chan: ParamValue::Scalar(0.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
        }
    }

    /// Input channel(s) to read.
    pub fn chan(mut self, chan: impl Into<ParamValue>) -> Self {
        self.chan = chan.into();
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

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for Input {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let ch = inputs.param(CHAN, i).first().max(0.0) as usize;
            match res.input(ch) {
                Some(src) => {
                    let n = buf.len().min(src.len());
                    buf[..n].copy_from_slice(&src[..n]);
                }
                None => buf.silence(),
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for Input {
    fn into_def(self) -> NodeDef {
        let chan = self.chan.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("chan", chan)
            .mul(mul)
            .add(add)
    }
}
