//! Wave-terrain matrix reader

use crate::error::NodeFault;
use crate::matrix::MatrixId;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};
use crate::table::AddressMode;

const X: usize = 0;
const Y: usize = 1;

/// Scans a matrix at fractional `(x, y)` coordinates, both normalized
/// to `[0, 1]` - wave-terrain synthesis when both are driven by
/// oscillators.
pub struct MatrixRead {
    matrix: MatrixId,
    mode: AddressMode,
    x: ParamValue,
    y: ParamValue,
    mul: ParamValue,
    add: ParamValue,
}

impl MatrixRead {
    pub fn new(matrix: MatrixId) -> Self {
        Self {
            matrix,
            mode: AddressMode::Wrap,
            x: ParamValue::Scalar(0.0),
            y: ParamValue::Scalar(0.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
        }
    }

    pub fn mode(mut self, mode: AddressMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn x(mut self, x: impl Into<ParamValue>) -> Self {
        self.x = x.into();
        self
    }

    pub fn y(mut self, y: impl Into<ParamValue>) -> Self {
        self.y = y.into();
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

impl Generator for MatrixRead {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let matrix = res
            .matrices
            .get(self.matrix)
            .ok_or(NodeFault::MatrixMissing(self.matrix))?;
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let x = inputs.param(X, i);
            let y = inputs.param(Y, i);
            for j in 0..buf.len() {
                buf[j] = matrix.read(x.at(j), y.at(j), self.mode);
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for MatrixRead {
    fn into_def(self) -> NodeDef {
        let x = self.x.clone();
        let y = self.y.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("x", x)
            .param("y", y)
            .mul(mul)
            .add(add)
    }
}
