//! One-shot / looping table player

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};
use crate::table::{AddressMode, Interp, Interpolator, TableId};

const SPEED: usize = 0;

/// Plays a table back at `speed` (1.0 = recorded rate).
///
/// Stream `i` reads table channel `i mod chnls`. Without looping, the
/// trigger channel fires in the block where the end of the table is
/// reached, and the node outputs silence until re-played - the usual
/// hook for "on end of playback, choose something new and restart".
pub struct TablePlay {
    table: TableId,
    looping: bool,
    interp: Interpolator,
    speed: ParamValue,
    mul: ParamValue,
    add: ParamValue,
    pos: Vec<f64>,
    done: bool,
}

impl TablePlay {
    pub fn new(table: TableId) -> Self {
        Self {
            table,
            looping: false,
            interp: Interpolator::new(Interp::Linear),
            speed: ParamValue::Scalar(1.0),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            pos: Vec::new(),
            done: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn interp(mut self, interp: Interp) -> Self {
        self.interp = Interpolator::new(interp);
        self
    }

    pub fn speed(mut self, speed: impl Into<ParamValue>) -> Self {
        self.speed = speed.into();
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

impl Generator for TablePlay {
    fn prepare(&mut self, _ctx: &ProcessContext, arity: usize) {
        self.pos = vec![0.0; arity];
    }

    fn on_play(&mut self) {
        for p in self.pos.iter_mut() {
            *p = 0.0;
        }
        self.done = false;
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

        if self.done {
            for buf in out.buffers().iter_mut() {
                buf.silence();
            }
            return Ok(());
        }

        let len = table.len() as f64;
        let rate = table.sample_rate() as f64 / ctx.sample_rate as f64;
        let mut reached_end = false;

        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let speed = inputs.param(SPEED, i);
            let mut pos = self.pos[i];
            for j in 0..buf.len() {
                if pos >= len {
                    if self.looping {
                        pos = pos.rem_euclid(len);
                    } else {
                        // End of data: the rest of the stream is silence.
                        if i == 0 {
                            reached_end = true;
                        }
                        buf[j] = 0.0;
                        continue;
                    }
                }
                buf[j] = table.read(i, pos as f32, &self.interp, AddressMode::Clamp);
                pos += speed.at(j) as f64 * rate;
            }
            self.pos[i] = pos;
        }

        if reached_end {
            self.done = true;
            out.fire();
        }
        Ok(())
    }
}

impl IntoNodeDef for TablePlay {
    fn into_def(self) -> NodeDef {
        let speed = self.speed.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("speed", speed)
            .mul(mul)
            .add(add)
            .with_trigger()
    }
}
