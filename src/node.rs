//! Core node abstractions - parameters, multichannel expansion, the
//! [`Generator`] trait implemented by every node kind.

use crate::buffer::Buffer;
use crate::error::NodeFault;
use crate::graph::GraphCtl;
use crate::matrix::MatrixStore;
use crate::table::TableStore;
use crate::trigger::TriggerChannel;

/// Unique identifier for a node within a server's graph.
///
/// Ids are stable for the node's lifetime. All cross-node references
/// (signal-valued parameters, trigger watches) are ids, never pointers,
/// so reference cycles in user patches cannot create ownership cycles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// Information available during block computation.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100.0)
    pub sample_rate: f32,
    /// Number of samples per block
    pub block_size: usize,
    /// Monotonic block counter, advanced once per tick
    pub block: u64,
}

/// A node parameter.
///
/// Parameters are a tagged union resolved per block through the node
/// arena - no dynamic type inspection on the audio path:
///
/// - `Scalar` - one constant for every stream
/// - `List` - one constant per stream, wrapping cyclically
/// - `Node` - signal-rate reference to all streams of another node
/// - `Stream` - signal-rate reference to a single stream of another node
#[derive(Clone, Debug)]
pub enum ParamValue {
    Scalar(f32),
    List(Vec<f32>),
    Node(NodeId),
    Stream(NodeId, usize),
}

impl ParamValue {
    /// Channel weight of this parameter under the expansion rule:
    /// scalars count 1, lists their length, node references their arity.
    pub(crate) fn effective_len(&self, arity_of: &dyn Fn(NodeId) -> usize) -> usize {
        match self {
            ParamValue::Scalar(_) => 1,
            ParamValue::List(l) => l.len().max(1),
            ParamValue::Node(id) => arity_of(*id).max(1),
            ParamValue::Stream(_, _) => 1,
        }
    }

    /// The node this parameter depends on, if it is signal-valued.
    pub(crate) fn dependency(&self) -> Option<NodeId> {
        match self {
            ParamValue::Node(id) | ParamValue::Stream(id, _) => Some(*id),
            _ => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<Vec<f32>> for ParamValue {
    fn from(v: Vec<f32>) -> Self {
        ParamValue::List(v)
    }
}

impl From<&[f32]> for ParamValue {
    fn from(v: &[f32]) -> Self {
        ParamValue::List(v.to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for ParamValue {
    fn from(v: [f32; N]) -> Self {
        ParamValue::List(v.to_vec())
    }
}

impl From<NodeId> for ParamValue {
    fn from(id: NodeId) -> Self {
        ParamValue::Node(id)
    }
}

impl From<(NodeId, usize)> for ParamValue {
    fn from((id, stream): (NodeId, usize)) -> Self {
        ParamValue::Stream(id, stream)
    }
}

/// Output arity of a node under the multichannel expansion rule:
/// the max effective length across all parameters, 1 if all are scalar.
/// `mul` and `add` are parameters too and participate.
pub(crate) fn expand_arity(
    params: &[(&'static str, ParamValue)],
    mul: &ParamValue,
    add: &ParamValue,
    arity_of: &dyn Fn(NodeId) -> usize,
) -> usize {
    params
        .iter()
        .map(|(_, p)| p.effective_len(arity_of))
        .chain(Some(mul.effective_len(arity_of)))
        .chain(Some(add.effective_len(arity_of)))
        .max()
        .unwrap_or(1)
}

/// A parameter resolved for one stream of one block.
#[derive(Clone, Copy, Debug)]
pub enum ParamView<'a> {
    /// Same value for every sample of the block
    Const(f32),
    /// One value per sample, read from another node's current buffer
    Sig(&'a [f32]),
}

impl<'a> ParamView<'a> {
    /// Value at sample `i` of the block.
    #[inline]
    pub fn at(&self, i: usize) -> f32 {
        match self {
            ParamView::Const(v) => *v,
            ParamView::Sig(buf) => buf[i],
        }
    }

    /// Value at the start of the block (for block-rate parameters).
    #[inline]
    pub fn first(&self) -> f32 {
        match self {
            ParamView::Const(v) => *v,
            ParamView::Sig(buf) => buf.first().copied().unwrap_or(0.0),
        }
    }
}

/// Stream resolution against the arena, seen from inside a generator.
pub(crate) trait StreamLookup {
    /// Current buffer of `stream` of `node`, if both exist.
    fn stream(&self, node: NodeId, stream: usize) -> Option<&[f32]>;
    /// Output arity of `node` (0 if unknown).
    fn arity(&self, node: NodeId) -> usize;
}

/// Read access to a node's resolved parameters during its compute step.
///
/// Signal-valued parameters read the referenced stream's *current* buffer:
/// dependency ordering guarantees the dependency was evaluated earlier in
/// the same block.
pub struct Inputs<'a> {
    pub(crate) params: &'a [(&'static str, ParamValue)],
    pub(crate) streams: &'a dyn StreamLookup,
}

impl<'a> Inputs<'a> {
    /// Resolve parameter `idx` for stream `stream` of the computing node.
    ///
    /// Lists wrap cyclically; a reference to a node of smaller arity wraps
    /// over that node's streams. A reference to a node that no longer
    /// exists resolves to silence.
    pub fn param(&self, idx: usize, stream: usize) -> ParamView<'a> {
        resolve(&self.params[idx].1, stream, self.streams)
    }

    /// Number of declared parameters.
    pub fn count(&self) -> usize {
        self.params.len()
    }
}

pub(crate) fn resolve<'a>(
    value: &'a ParamValue,
    stream: usize,
    streams: &'a dyn StreamLookup,
) -> ParamView<'a> {
    match value {
        ParamValue::Scalar(v) => ParamView::Const(*v),
        ParamValue::List(l) => {
            if l.is_empty() {
                ParamView::Const(0.0)
            } else {
                ParamView::Const(l[stream % l.len()])
            }
        }
        ParamValue::Node(id) => {
            let arity = streams.arity(*id);
            if arity == 0 {
                return ParamView::Const(0.0);
            }
            match streams.stream(*id, stream % arity) {
                Some(buf) => ParamView::Sig(buf),
                None => ParamView::Const(0.0),
            }
        }
        ParamValue::Stream(id, s) => match streams.stream(*id, *s) {
            Some(buf) => ParamView::Sig(buf),
            None => ParamView::Const(0.0),
        },
    }
}

/// A node's output streams plus its trigger channel, if it declared one.
pub struct Outputs<'a> {
    pub(crate) buffers: &'a mut [Buffer],
    pub(crate) trigger: Option<&'a mut TriggerChannel>,
    pub(crate) block: u64,
}

impl<'a> Outputs<'a> {
    /// Output streams of the node (length = arity).
    #[inline]
    pub fn buffers(&mut self) -> &mut [Buffer] {
        self.buffers
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.buffers.len()
    }

    /// Fire the node's trigger channel for the current block.
    ///
    /// No-op for nodes without a trigger channel.
    pub fn fire(&mut self) {
        if let Some(t) = self.trigger.as_mut() {
            t.fire(self.block);
        }
    }
}

/// Shared sample memory and physical input, seen from inside a generator.
pub struct Resources<'a> {
    pub tables: &'a mut TableStore,
    pub matrices: &'a mut MatrixStore,
    pub(crate) input: &'a [Buffer],
}

impl<'a> Resources<'a> {
    /// Physical input channel `ch` for the current block.
    ///
    /// Empty unless the server was configured duplex.
    pub fn input(&self, ch: usize) -> Option<&[f32]> {
        self.input.get(ch).map(|b| &**b)
    }

    pub fn input_channels(&self) -> usize {
        self.input.len()
    }
}

/// Per-block compute for one node kind.
///
/// Implementations must not write to `out` before validating their
/// preconditions (missing tables, bad state): when `process` errors, the
/// scheduler holds the streams at their last values, which only works if
/// the failed call left them untouched.
pub trait Generator: Send + 'static {
    /// Called once when the node is added, with its expanded arity.
    /// Allocate per-stream state here, never in `process`.
    fn prepare(&mut self, _ctx: &ProcessContext, _arity: usize) {}

    /// Called when the node is (re)started via `play`.
    fn on_play(&mut self) {}

    /// Compute one block into `out`, one buffer per stream.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &Inputs,
        res: &mut Resources,
        out: &mut Outputs,
    ) -> Result<(), NodeFault>;
}

/// Listener registration: watch a node's trigger channel and run a
/// callback once per consumed event, before dependents compute.
pub struct Listener {
    pub(crate) watch: NodeId,
    pub(crate) callback: Box<dyn FnMut(&mut GraphCtl) + Send>,
    pub(crate) seen: u64,
}

/// Everything the graph needs to instantiate a node: the generator, its
/// declared parameters in index order, `mul`/`add`, and optional trigger
/// and listener registrations.
pub struct NodeDef {
    pub(crate) generator: Box<dyn Generator>,
    pub(crate) params: Vec<(&'static str, ParamValue)>,
    pub(crate) mul: ParamValue,
    pub(crate) add: ParamValue,
    pub(crate) with_trigger: bool,
    pub(crate) listener: Option<Listener>,
}

impl NodeDef {
    pub fn new(generator: impl Generator) -> Self {
        Self {
            generator: Box::new(generator),
            params: Vec::new(),
            mul: ParamValue::Scalar(1.0),
            add: ParamValue::Scalar(0.0),
            with_trigger: false,
            listener: None,
        }
    }

    /// Declare the next parameter. Declaration order fixes the index the
    /// generator uses in [`Inputs::param`].
    pub fn param(mut self, name: &'static str, value: impl Into<ParamValue>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    pub fn mul(mut self, value: impl Into<ParamValue>) -> Self {
        self.mul = value.into();
        self
    }

    pub fn add(mut self, value: impl Into<ParamValue>) -> Self {
        self.add = value.into();
        self
    }

    /// Give the node a trigger channel.
    pub fn with_trigger(mut self) -> Self {
        self.with_trigger = true;
        self
    }

    /// Register a listener on `watch`'s trigger channel.
    pub fn listen(
        mut self,
        watch: NodeId,
        callback: impl FnMut(&mut GraphCtl) + Send + 'static,
    ) -> Self {
        self.listener = Some(Listener {
            watch,
            callback: Box::new(callback),
            seen: 0,
        });
        self
    }
}

/// Conversion from a node builder into a [`NodeDef`].
///
/// Every built-in node implements this; custom nodes implement it the
/// same way: move the generator in, declare parameters in index order.
pub trait IntoNodeDef {
    fn into_def(self) -> NodeDef;
}

impl IntoNodeDef for NodeDef {
    fn into_def(self) -> NodeDef {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arity_table(pairs: &[(NodeId, usize)]) -> impl Fn(NodeId) -> usize + '_ {
        move |id| {
            pairs
                .iter()
                .find(|(n, _)| *n == id)
                .map(|(_, a)| *a)
                .unwrap_or(0)
        }
    }

    #[test]
    fn all_scalar_params_give_arity_one() {
        let params = vec![("freq", ParamValue::Scalar(440.0))];
        let arity_of = arity_table(&[]);
        let arity = expand_arity(
            &params,
            &ParamValue::Scalar(1.0),
            &ParamValue::Scalar(0.0),
            &arity_of,
        );
        assert_eq!(arity, 1);
    }

    #[test]
    fn longest_list_wins() {
        let params = vec![
            ("freq", ParamValue::List(vec![100.0, 200.0, 300.0])),
            ("phase", ParamValue::List(vec![0.0, 0.5])),
        ];
        let arity_of = arity_table(&[]);
        let arity = expand_arity(
            &params,
            &ParamValue::Scalar(1.0),
            &ParamValue::Scalar(0.0),
            &arity_of,
        );
        assert_eq!(arity, 3);
    }

    #[test]
    fn mul_list_participates_in_expansion() {
        let params = vec![("freq", ParamValue::Scalar(440.0))];
        let arity_of = arity_table(&[]);
        let arity = expand_arity(
            &params,
            &ParamValue::List(vec![0.1, 0.2, 0.3, 0.4]),
            &ParamValue::Scalar(0.0),
            &arity_of,
        );
        assert_eq!(arity, 4);
    }

    #[test]
    fn node_reference_counts_its_arity() {
        let lfo = NodeId(7);
        let params = vec![("freq", ParamValue::Node(lfo))];
        let pairs = [(lfo, 2)];
        let arity_of = arity_table(&pairs);
        let arity = expand_arity(
            &params,
            &ParamValue::Scalar(1.0),
            &ParamValue::Scalar(0.0),
            &arity_of,
        );
        assert_eq!(arity, 2);
    }

    #[test]
    fn lists_wrap_cyclically() {
        struct NoStreams;
        impl StreamLookup for NoStreams {
            fn stream(&self, _: NodeId, _: usize) -> Option<&[f32]> {
                None
            }
            fn arity(&self, _: NodeId) -> usize {
                0
            }
        }
        let params = vec![("freq", ParamValue::List(vec![100.0, 200.0]))];
        let inputs = Inputs {
            params: &params,
            streams: &NoStreams,
        };
        // stream 2 reuses index 0, stream 3 reuses index 1
        assert_eq!(inputs.param(0, 0).first(), 100.0);
        assert_eq!(inputs.param(0, 1).first(), 200.0);
        assert_eq!(inputs.param(0, 2).first(), 100.0);
        assert_eq!(inputs.param(0, 3).first(), 200.0);
    }
}
