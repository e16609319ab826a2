//! Trigger listener

use crate::error::NodeFault;
use crate::graph::GraphCtl;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, NodeId, Outputs, ProcessContext, Resources,
};

/// Runs a callback every time a watched trigger channel fires.
///
/// The callback runs synchronously inside the block, at this node's
/// position in evaluation order - so nodes that depend (directly or via
/// the watch edge) on its side effects see them in the same block. It
/// receives a [`GraphCtl`] and may mutate parameters, lifecycle, routing
/// and shared memory; reactive chains like "on end of playback, pick a
/// new table and restart" are the intended use.
pub struct TrigFunc {
    watch: NodeId,
    callback: Option<Box<dyn FnMut(&mut GraphCtl) + Send>>,
}

impl TrigFunc {
    pub fn new(watch: NodeId, callback: impl FnMut(&mut GraphCtl) + Send + 'static) -> Self {
        Self {
            watch,
            callback: Some(Box::new(callback)),
        }
    }
}

impl Generator for TrigFunc {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _inputs: &Inputs,
        _res: &mut Resources,
        _out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        // All the work happens in the listener poll; the audio stream
        // stays silent.
        Ok(())
    }
}

impl IntoNodeDef for TrigFunc {
    fn into_def(mut self) -> NodeDef {
        let watch = self.watch;
        let callback = self.callback.take().expect("callback taken");
        NodeDef::new(self).listen(watch, callback)
    }
}
