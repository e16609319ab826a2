//! Table recorder

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};
use crate::table::TableId;

const INPUT: usize = 0;

/// Records its input signal into a table, one pass of the table's
/// length per `play`.
///
/// The first and last `fade` seconds of the pass are cross-faded with a
/// raised-cosine ramp against the table's existing content, so a loop
/// point has no discontinuity. Re-playing while a pass is active
/// restarts it; with overdub enabled the new pass mixes over the old
/// content at the `feedback` coefficient instead of replacing it. The
/// trigger channel fires once in the block where the pass completes.
///
/// Input stream `i` records into table channel `i`; the audio output of
/// the node itself is silence.
pub struct TableRec {
    table: TableId,
    fade: f32,
    overdub: bool,
    feedback: f32,
    input: ParamValue,
    pos: usize,
    active: bool,
}

impl TableRec {
    pub fn new(input: impl Into<ParamValue>, table: TableId) -> Self {
        Self {
            table,
            fade: 0.0,
            overdub: false,
            feedback: 0.5,
            input: input.into(),
            pos: 0,
            active: false,
        }
    }

    /// Cross-fade length at both ends of the pass, in seconds.
    pub fn fade(mut self, fade: f32) -> Self {
        self.fade = fade.max(0.0);
        self
    }

    /// Mix new material over the old at `feedback` instead of replacing.
    pub fn overdub(mut self, feedback: f32) -> Self {
        self.overdub = true;
        self.feedback = feedback;
        self
    }
}

impl Generator for TableRec {
    fn on_play(&mut self) {
        // A record call while a pass is active restarts the pass.
        self.pos = 0;
        self.active = true;
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
            .get_mut(self.table)
            .ok_or(NodeFault::TableMissing(self.table))?;

        // The node's own streams are always silent; recording is a side
        // effect on the table.
        for buf in out.buffers().iter_mut() {
            buf.silence();
        }
        if !self.active {
            return Ok(());
        }

        let len = table.len();
        let fade_samples = ((self.fade * ctx.sample_rate) as usize).min(len / 2);
        let chnls = table.chnls();
        let start = self.pos;
        let mut end = start;

        for c in 0..chnls {
            let input = inputs.param(INPUT, c);
            let ch = table.channel_mut(c);
            for j in 0..ctx.block_size {
                let idx = start + j;
                if idx >= len {
                    break;
                }
                // Raised-cosine gain over the fade regions.
                let g = if fade_samples > 0 && idx < fade_samples {
                    let t = idx as f32 / fade_samples as f32;
                    0.5 - 0.5 * (t * core::f32::consts::PI).cos()
                } else if fade_samples > 0 && idx >= len - fade_samples {
                    let t = (len - 1 - idx) as f32 / fade_samples as f32;
                    0.5 - 0.5 * (t * core::f32::consts::PI).cos()
                } else {
                    1.0
                };
                let x = input.at(j);
                let old = ch[idx];
                ch[idx] = if self.overdub {
                    old * self.feedback + x * g
                } else {
                    old * (1.0 - g) + x * g
                };
                if c == 0 {
                    end = idx + 1;
                }
            }
        }

        self.pos = end;
        if self.pos >= len {
            self.active = false;
            out.fire();
        }
        Ok(())
    }
}

impl IntoNodeDef for TableRec {
    fn into_def(self) -> NodeDef {
        let input = self.input.clone();
        NodeDef::new(self).param("input", input).with_trigger()
    }
}
