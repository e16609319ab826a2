//! Table morph writer

use crate::error::NodeFault;
use crate::node::{
    Generator, Inputs, IntoNodeDef, NodeDef, Outputs, ParamValue, ProcessContext, Resources,
};
use crate::table::TableId;

const POS: usize = 0;

/// Keeps a destination table equal to the weighted blend of an ordered
/// source list.
///
/// `pos` in `[0, len(sources)-1]` selects the two bracketing sources and
/// blends them linearly; integral positions read identically to a single
/// source. The destination is fully recomputed in any block where `pos`
/// moved or a source was edited, and left alone otherwise.
pub struct TableMorph {
    dest: TableId,
    sources: Vec<TableId>,
    pos: ParamValue,
    last_pos: Option<f32>,
    last_versions: u64,
}

impl TableMorph {
    pub fn new(pos: impl Into<ParamValue>, dest: TableId, sources: Vec<TableId>) -> Self {
        Self {
            dest,
            sources,
            pos: pos.into(),
            last_pos: None,
            last_versions: 0,
        }
    }
}

impl Generator for TableMorph {
    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault> {
        for buf in out.buffers().iter_mut() {
            buf.silence();
        }

        // Block-rate: the position is sampled once at block start.
        let pos = inputs.param(POS, 0).first();
        let versions = res.tables.versions(&self.sources);
        if self.last_pos == Some(pos) && versions == self.last_versions {
            return Ok(());
        }

        res.tables
            .morph_into(self.dest, &self.sources, pos)
            .map_err(|_| NodeFault::TableMissing(self.dest))?;
        self.last_pos = Some(pos);
        self.last_versions = versions;
        Ok(())
    }
}

impl IntoNodeDef for TableMorph {
    fn into_def(self) -> NodeDef {
        let pos = self.pos.clone();
        NodeDef::new(self).param("pos", pos)
    }
}
