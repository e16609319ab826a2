//! Matrix row recorder

use crate::error::NodeFault;
use crate::matrix::MatrixId;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const INPUT: usize = 0;

/// Records a stream into a matrix row by row: samples fill the current
/// row left to right, then the write head drops to the next row. The
/// trigger channel fires once when the last row completes.
///
/// Recording a periodic signal whose cycle matches the row length turns
/// the matrix into a terrain of the signal's evolution over time.
pub struct MatrixRec {
    matrix: MatrixId,
    input: ParamValue,
    row: usize,
    col: usize,
    active: bool,
    scratch: Vec<f32>,
}

impl MatrixRec {
    pub fn new(input: impl Into<ParamValue>, matrix: MatrixId) -> Self {
        Self {
            matrix,
            input: input.into(),
            row: 0,
            col: 0,
            active: false,
            scratch: Vec::new(),
        }
    }
}

impl Generator for MatrixRec {
    fn prepare(&mut self, ctx: &ProcessContext, _arity: usize) {
        self.scratch = vec![0.0; ctx.block_size];
    }

    fn on_play(&mut self) {
        self.row = 0;
        self.col = 0;
        self.active = true;
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let matrix = res
            .matrices
            .get_mut(self.matrix)
            .ok_or(NodeFault::MatrixMissing(self.matrix))?;

        for buf in out.buffers().iter_mut() {
            buf.silence();
        }
        if !self.active {
            return Ok(());
        }

        let input = inputs.param(INPUT, 0);
        for j in 0..ctx.block_size {
            self.scratch[j] = input.at(j);
        }

        let rows = matrix.rows();
        let mut offset = 0;
        while offset < ctx.block_size && self.active {
            let written = matrix.write_run(self.row, self.col, &self.scratch[offset..]);
            offset += written.max(1);
            self.col += written;
            if self.col >= matrix.cols() {
                self.col = 0;
                self.row += 1;
                if self.row >= rows {
                    self.active = false;
                    out.fire();
                }
            }
        }
        Ok(())
    }
}

impl IntoNodeDef for MatrixRec {
    fn into_def(self) -> NodeDef {
        let input = self.input.clone();
        NodeDef::new(self).param("input", input).with_trigger()
    }
}
