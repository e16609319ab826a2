//! White noise source

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

/// Uniform white noise in [-1, 1).
pub struct Noise {
    mul: ParamValue,
    add: ParamValue,
    rng: fastrand::Rng,
}

impl Noise {
    pub fn new() -> Self {
        Self {
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            rng: fastrand::Rng::new(),
        }
    }

    /// Seed the generator for reproducible output.
    pub fn seeded(seed: u64) -> Self {
        Self {
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            rng: fastrand::Rng::with_seed(seed),
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

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for Noise {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _inputs: &Inputs,
        _res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        for buf in out.buffers().iter_mut() {
            for j in 0..buf.len() {
                buf[j] = self.rng.f32() * 2.0 - 1.0;
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for Noise {
    fn into_def(self) -> NodeDef {
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self).mul(mul).add(add)
    }
}
