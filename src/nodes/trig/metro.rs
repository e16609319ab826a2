//! Periodic trigger source

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};

const TIME: usize = 0;

/// A metronome: fires its trigger channel every `time` seconds,
/// quantized to the block clock.
///
/// The first pulse lands on the first block after (re)start. The audio
/// streams carry 1.0 for a fired block and 0.0 otherwise, so the pulse
/// train can also be used as a signal.
pub struct Metro {
    time: ParamValue,
    mul: ParamValue,
    add: ParamValue,
    countdown: Vec<f64>,
}

impl Metro {
    pub fn new(time: impl Into<ParamValue>) -> Self {
        Self {
            time: time.into(),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            countdown: Vec::new(),
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

impl Generator for Metro {
    fn prepare(&mut self, _ctx: &ProcessContext, arity: usize) {
        self.countdown = vec![0.0; arity];
    }

    fn on_play(&mut self) {
        for c in self.countdown.iter_mut() {
            *c = 0.0;
        }
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &Inputs,
        _res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        let block_secs = ctx.block_size as f64 / ctx.sample_rate as f64;
        let mut fired = false;
        for (i, buf) in out.buffers().iter_mut().enumerate() {
            let interval = (inputs.param(TIME, i).first() as f64).max(block_secs);
            let tick = self.countdown[i] <= 0.0;
            if tick {
                self.countdown[i] += interval;
                fired = true;
            }
            self.countdown[i] -= block_secs;
            let level = if tick { 1.0 } else { 0.0 };
            for j in 0..buf.len() {
                buf[j] = level;
            }
        }
        if fired {
            out.fire();
        }
        Ok(())
    }
}

impl IntoNodeDef for Metro {
    fn into_def(self) -> NodeDef {
        let time = self.time.clone();
        let mul = self.mul.clone();
        let add = self.add.clone();
        NodeDef::new(self)
            .param("time", time)
            .mul(mul)
            .add(add)
            .with_trigger()
    }
}
