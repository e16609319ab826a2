//! The node arena and per-block evaluation.
//!
//! All nodes live in one arena with stable integer ids; references
//! between nodes are ids, never owning pointers, so teardown is
//! order-independent and feedback patches cannot create ownership
//! cycles. Semantic dependency cycles are a different thing and are
//! rejected at bind time.

use core::cmp::Reverse;
use core::mem;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::buffer::Buffer;
use crate::error::GraphError;
use crate::matrix::MatrixStore;
use crate::node::{
    expand_arity, resolve, Generator, Inputs, Listener, NodeDef, NodeId, Outputs, ParamValue,
    ParamView, ProcessContext, Resources, StreamLookup,
};
use crate::table::TableStore;
use crate::trigger::TriggerChannel;

/// Channel-routing request for [`Graph::route`].
///
/// Priority order of the fields matches the binding rules: an explicit
/// `list` wins; otherwise a negative `channel` spreads streams from 0 by
/// `increment` and shuffles the assignment once; otherwise streams start
/// at `channel` and step by `increment`. Everything is reduced modulo the
/// physical channel count.
#[derive(Clone, Debug)]
pub struct Route {
    pub channel: i32,
    pub increment: usize,
    pub list: Option<Vec<usize>>,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            channel: 0,
            increment: 1,
            list: None,
        }
    }
}

impl Route {
    pub fn channel(channel: i32) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn spread(increment: usize) -> Self {
        Self {
            channel: -1,
            increment,
            list: None,
        }
    }

    pub fn list(list: Vec<usize>) -> Self {
        Self {
            channel: 0,
            increment: 1,
            list: Some(list),
        }
    }
}

pub(crate) struct Slot {
    id: NodeId,
    reg: usize,
    state: Option<Box<dyn Generator>>,
    params: Vec<(&'static str, ParamValue)>,
    mul: ParamValue,
    add: ParamValue,
    arity: usize,
    outputs: Vec<Buffer>,
    trigger: Option<TriggerChannel>,
    listener: Option<Listener>,
    playing: bool,
    delay: Option<u64>,
    dur: Option<u64>,
    pending_dur: Option<u64>,
    route: Option<Vec<usize>>,
    faults: u64,
}

impl Slot {
    fn dependencies<'a>(&'a self) -> impl Iterator<Item = NodeId> + 'a {
        self.params
            .iter()
            .filter_map(|(_, p)| p.dependency())
            .chain(self.mul.dependency())
            .chain(self.add.dependency())
            .chain(self.listener.as_ref().map(|l| l.watch))
            .unique()
    }
}

struct ArenaView<'a> {
    slots: &'a [Slot],
    index: &'a HashMap<NodeId, usize>,
}

impl<'a> StreamLookup for ArenaView<'a> {
    fn stream(&self, node: NodeId, stream: usize) -> Option<&[f32]> {
        let &k = self.index.get(&node)?;
        self.slots[k].outputs.get(stream).map(|b| &**b)
    }

    fn arity(&self, node: NodeId) -> usize {
        self.index
            .get(&node)
            .map(|&k| self.slots[k].arity)
            .unwrap_or(0)
    }
}

/// The signal graph: node arena, dependency order, shared tables and
/// matrices. Owned by a [`Server`](crate::Server); evaluated once per
/// block tick.
pub struct Graph {
    slots: Vec<Slot>,
    index: HashMap<NodeId, usize>,
    /// Evaluation order: registration order filtered by dependency order.
    order: Vec<NodeId>,
    order_dirty: bool,
    ids: Arc<AtomicU32>,
    next_reg: usize,
    sample_rate: f32,
    block_size: usize,
    channels: usize,
    pub(crate) tables: TableStore,
    pub(crate) matrices: MatrixStore,
    fault_count: u64,
}

impl Graph {
    pub(crate) fn new(
        sample_rate: f32,
        block_size: usize,
        channels: usize,
        ids: Arc<AtomicU32>,
    ) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            order_dirty: false,
            ids,
            next_reg: 0,
            sample_rate,
            block_size,
            channels,
            tables: TableStore::new(),
            matrices: MatrixStore::new(),
            fault_count: 0,
        }
    }

    /// Add a node. Expands its channel count from its parameters, checks
    /// every reference, and allocates one buffer per stream.
    pub fn add(&mut self, def: NodeDef) -> Result<NodeId, GraphError> {
        let id = NodeId(self.ids.fetch_add(1, Ordering::Relaxed));
        self.add_with_id(id, def)
    }

    /// Add a node under a pre-allocated id (the command-queue path, where
    /// the control side needs the id before the node joins the graph).
    pub(crate) fn add_with_id(&mut self, id: NodeId, def: NodeDef) -> Result<NodeId, GraphError> {
        self.validate_refs(&def.params, &def.mul, &def.add)?;
        if let Some(l) = &def.listener {
            if !self.index.contains_key(&l.watch) {
                return Err(GraphError::UnknownNode(l.watch));
            }
        }

        let arity = {
            let index = &self.index;
            let slots = &self.slots;
            let arity_of =
                move |id: NodeId| index.get(&id).map(|&k| slots[k].arity).unwrap_or(0);
            expand_arity(&def.params, &def.mul, &def.add, &arity_of)
        };

        let mut state = def.generator;
        let ctx = ProcessContext {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            block: 0,
        };
        state.prepare(&ctx, arity);

        let slot = Slot {
            id,
            reg: self.next_reg,
            state: Some(state),
            params: def.params,
            mul: def.mul,
            add: def.add,
            arity,
            outputs: (0..arity).map(|_| Buffer::new(self.block_size)).collect(),
            trigger: if def.with_trigger {
                Some(TriggerChannel::new())
            } else {
                None
            },
            listener: def.listener,
            playing: true,
            delay: None,
            dur: None,
            pending_dur: None,
            route: None,
            faults: 0,
        };
        self.next_reg += 1;
        self.index.insert(id, self.slots.len());
        self.slots.push(slot);
        self.order_dirty = true;
        tracing::debug!(node = id.0, arity, "node added");
        Ok(id)
    }

    /// Remove a node. Parameters of other nodes that referenced it
    /// resolve to silence from the next block on.
    pub fn remove(&mut self, id: NodeId) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        self.slots.swap_remove(k);
        self.index.remove(&id);
        if k < self.slots.len() {
            let moved = self.slots[k].id;
            self.index.insert(moved, k);
        }
        self.order_dirty = true;
        tracing::debug!(node = id.0, "node removed");
        Ok(())
    }

    /// Re-assign a declared parameter.
    ///
    /// Never changes arity - only the cyclic mapping of values to the
    /// existing streams. A binding that would make the node (transitively)
    /// its own dependency is rejected.
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &'static str,
        value: impl Into<ParamValue>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        self.check_binding(id, &value)?;
        let k = self.slot_index(id)?;
        let param = self.slots[k]
            .params
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or(GraphError::UnknownParam { node: id, name })?;
        param.1 = value;
        self.order_dirty = true;
        Ok(())
    }

    pub fn set_mul(&mut self, id: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        let value = value.into();
        self.check_binding(id, &value)?;
        let k = self.slot_index(id)?;
        self.slots[k].mul = value;
        self.order_dirty = true;
        Ok(())
    }

    pub fn set_add(&mut self, id: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        let value = value.into();
        self.check_binding(id, &value)?;
        let k = self.slot_index(id)?;
        self.slots[k].add = value;
        self.order_dirty = true;
        Ok(())
    }

    /// Start computing at the next block boundary.
    pub fn play(&mut self, id: NodeId) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        let slot = &mut self.slots[k];
        slot.playing = true;
        slot.delay = None;
        slot.dur = None;
        slot.pending_dur = None;
        if let Some(state) = slot.state.as_mut() {
            state.on_play();
        }
        Ok(())
    }

    /// Start after `delay` blocks, optionally auto-stopping after `dur`
    /// blocks of activity.
    pub fn play_after(
        &mut self,
        id: NodeId,
        delay: u64,
        dur: Option<u64>,
    ) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        let slot = &mut self.slots[k];
        if delay == 0 {
            slot.playing = true;
            slot.dur = dur;
            slot.pending_dur = None;
            if let Some(state) = slot.state.as_mut() {
                state.on_play();
            }
        } else {
            slot.playing = false;
            slot.delay = Some(delay);
            slot.pending_dur = dur;
        }
        Ok(())
    }

    /// Stop at the next block boundary. The node's streams read as
    /// silence downstream from then on.
    pub fn stop(&mut self, id: NodeId) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        let slot = &mut self.slots[k];
        slot.playing = false;
        slot.delay = None;
        slot.dur = None;
        slot.pending_dur = None;
        for b in slot.outputs.iter_mut() {
            b.silence();
        }
        Ok(())
    }

    /// Bind the node's streams to physical output channels.
    pub fn route(&mut self, id: NodeId, route: Route) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        let arity = self.slots[k].arity;
        let channels = self.channels;
        let assignment: Vec<usize> = match route.list {
            Some(list) if !list.is_empty() => (0..arity)
                .map(|i| list[i % list.len()] % channels)
                .collect(),
            _ if route.channel < 0 => {
                let mut a: Vec<usize> = (0..arity)
                    .map(|i| (i * route.increment) % channels)
                    .collect();
                // One-shot permutation at bind time, fixed thereafter.
                fastrand::shuffle(&mut a);
                a
            }
            _ => (0..arity)
                .map(|i| (route.channel as usize + i * route.increment) % channels)
                .collect(),
        };
        tracing::debug!(node = id.0, ?assignment, "routed");
        self.slots[k].route = Some(assignment);
        Ok(())
    }

    pub fn unroute(&mut self, id: NodeId) -> Result<(), GraphError> {
        let k = self.slot_index(id)?;
        self.slots[k].route = None;
        Ok(())
    }

    /// The bound channel assignment, if any (one entry per stream).
    pub fn routing(&self, id: NodeId) -> Option<&[usize]> {
        let &k = self.index.get(&id)?;
        self.slots[k].route.as_deref()
    }

    /// Instantaneous value of one stream: the last sample of its most
    /// recently computed block.
    pub fn get(&self, id: NodeId, stream: usize) -> Result<f32, GraphError> {
        let k = self.slot_index(id)?;
        let slot = &self.slots[k];
        slot.outputs
            .get(stream)
            .map(|b| b.current())
            .ok_or(GraphError::StreamOutOfRange {
                node: id,
                stream,
                arity: slot.arity,
            })
    }

    /// Output arity of a node.
    pub fn arity(&self, id: NodeId) -> Result<usize, GraphError> {
        Ok(self.slots[self.slot_index(id)?].arity)
    }

    pub fn is_playing(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.slots[self.slot_index(id)?].playing)
    }

    /// Event count of a node's trigger channel.
    pub fn trigger_count(&self, id: NodeId) -> Result<u64, GraphError> {
        let k = self.slot_index(id)?;
        Ok(self.slots[k].trigger.as_ref().map(|t| t.count()).unwrap_or(0))
    }

    /// Whether a node's trigger is in the Fired state for `block`.
    pub fn trigger_fired(&self, id: NodeId, block: u64) -> Result<bool, GraphError> {
        let k = self.slot_index(id)?;
        Ok(self.slots[k]
            .trigger
            .as_ref()
            .map(|t| t.is_fired(block))
            .unwrap_or(false))
    }

    /// Total contained per-node faults since creation.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    /// Run a closure against the listener mutation surface.
    pub(crate) fn ctl<R>(&mut self, f: impl FnOnce(&mut GraphCtl) -> R) -> R {
        let mut ctl = GraphCtl { graph: self };
        f(&mut ctl)
    }

    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, id: NodeId) -> Result<usize, GraphError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownNode(id))
    }

    fn validate_refs(
        &self,
        params: &[(&'static str, ParamValue)],
        mul: &ParamValue,
        add: &ParamValue,
    ) -> Result<(), GraphError> {
        for (_, p) in params.iter().chain([("mul", mul.clone()), ("add", add.clone())].iter()) {
            match p {
                ParamValue::Node(id) => {
                    self.slot_index(*id)?;
                }
                ParamValue::Stream(id, s) => {
                    let arity = self.slots[self.slot_index(*id)?].arity;
                    if *s >= arity {
                        return Err(GraphError::StreamOutOfRange {
                            node: *id,
                            stream: *s,
                            arity,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject a rebinding that would make `node` depend on itself.
    fn check_binding(&self, node: NodeId, value: &ParamValue) -> Result<(), GraphError> {
        if let Some(dep) = value.dependency() {
            self.slot_index(dep)?;
            if let ParamValue::Stream(id, s) = value {
                let arity = self.slots[self.slot_index(*id)?].arity;
                if *s >= arity {
                    return Err(GraphError::StreamOutOfRange {
                        node: *id,
                        stream: *s,
                        arity,
                    });
                }
            }
            if dep == node || self.reaches(dep, node) {
                return Err(GraphError::CyclicDependency);
            }
        }
        Ok(())
    }

    /// Whether `from` transitively depends on `to`.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen: Vec<NodeId> = Vec::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(&k) = self.index.get(&id) {
                stack.extend(self.slots[k].dependencies());
            }
        }
        false
    }

    /// Rebuild the evaluation order: topological over the dependency
    /// edges, registration order breaking ties.
    fn recompute_order(&mut self) {
        let mut g: DiGraph<NodeId, ()> = DiGraph::with_capacity(self.slots.len(), self.slots.len());
        let mut gi: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(self.slots.len());
        for slot in self.slots.iter() {
            gi.insert(slot.id, g.add_node(slot.id));
        }
        for slot in self.slots.iter() {
            for dep in slot.dependencies() {
                if let Some(&d) = gi.get(&dep) {
                    g.add_edge(d, gi[&slot.id], ());
                }
            }
        }

        let mut indegree: HashMap<NodeIndex, usize> = HashMap::with_capacity(g.node_count());
        for idx in g.node_indices() {
            indegree.insert(idx, g.neighbors_directed(idx, Direction::Incoming).count());
        }
        let mut ready: BinaryHeap<Reverse<(usize, NodeIndex)>> = BinaryHeap::new();
        for (&idx, &deg) in indegree.iter() {
            if deg == 0 {
                let reg = self.slots[self.index[&g[idx]]].reg;
                ready.push(Reverse((reg, idx)));
            }
        }

        self.order.clear();
        while let Some(Reverse((_, idx))) = ready.pop() {
            self.order.push(g[idx]);
            for succ in g.neighbors_directed(idx, Direction::Outgoing) {
                let deg = indegree.get_mut(&succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    let reg = self.slots[self.index[&g[succ]]].reg;
                    ready.push(Reverse((reg, succ)));
                }
            }
        }

        // Bind-time checks keep the graph acyclic; anything left over
        // here is a bug, not a user error.
        if self.order.len() != self.slots.len() {
            tracing::error!("dependency order incomplete; cycle slipped past bind checks");
        }
        self.order_dirty = false;
    }

    /// Evaluate one block.
    ///
    /// `input` holds the physical input channels (empty unless duplex),
    /// `out` the physical output channels, silenced and re-mixed here.
    pub(crate) fn run_block(&mut self, ctx: &ProcessContext, input: &[Buffer], out: &mut [Buffer]) {
        if self.order_dirty {
            self.recompute_order();
        }

        // Lifecycle first: scheduled starts and elapsed durations take
        // effect at the block boundary, never mid-block.
        for slot in self.slots.iter_mut() {
            if !slot.playing {
                // A scheduled start waits `delay` whole blocks.
                match slot.delay {
                    Some(0) => {
                        slot.delay = None;
                        slot.playing = true;
                        slot.dur = slot.pending_dur.take();
                        if let Some(state) = slot.state.as_mut() {
                            state.on_play();
                        }
                    }
                    Some(d) => slot.delay = Some(d - 1),
                    None => {}
                }
            } else {
                if let Some(d) = slot.dur {
                    if d == 0 {
                        slot.playing = false;
                        slot.dur = None;
                        for b in slot.outputs.iter_mut() {
                            b.silence();
                        }
                        tracing::debug!(node = slot.id.0, "duration elapsed");
                    } else {
                        slot.dur = Some(d - 1);
                    }
                }
            }
        }

        for oi in 0..self.order.len() {
            let id = self.order[oi];
            let k = match self.index.get(&id) {
                Some(&k) => k,
                None => continue,
            };

            if self.slots[k].listener.is_some() {
                self.poll_listener(k);
            }
            if !self.slots[k].playing {
                continue;
            }

            let mut state = match self.slots[k].state.take() {
                Some(s) => s,
                None => continue,
            };
            let mut bufs = mem::take(&mut self.slots[k].outputs);
            let mut trig = self.slots[k].trigger.take();

            let result;
            {
                let Graph {
                    ref slots,
                    ref index,
                    ref mut tables,
                    ref mut matrices,
                    ..
                } = *self;
                let view = ArenaView { slots, index };
                let inputs = Inputs {
                    params: &slots[k].params,
                    streams: &view,
                };
                let mut res = Resources {
                    tables,
                    matrices,
                    input,
                };
                let mut outputs = Outputs {
                    buffers: &mut bufs,
                    trigger: trig.as_mut(),
                    block: ctx.block,
                };
                result = state.process(ctx, &inputs, &mut res, &mut outputs);
            }

            match result {
                Ok(()) => {
                    let view = ArenaView {
                        slots: &self.slots,
                        index: &self.index,
                    };
                    let slot = &self.slots[k];
                    for (i, buf) in bufs.iter_mut().enumerate() {
                        let mul = resolve(&slot.mul, i, &view);
                        let add = resolve(&slot.add, i, &view);
                        if let (ParamView::Const(m), ParamView::Const(a)) = (mul, add) {
                            if m == 1.0 && a == 0.0 {
                                continue;
                            }
                        }
                        for j in 0..buf.len() {
                            buf[j] = buf[j] * mul.at(j) + add.at(j);
                        }
                    }
                }
                Err(fault) => {
                    // Isolated: streams keep their last values, the
                    // clock is never held up by error handling.
                    self.slots[k].faults += 1;
                    self.fault_count += 1;
                    tracing::warn!(
                        node = id.0,
                        faults = self.slots[k].faults,
                        %fault,
                        "node faulted; output held"
                    );
                }
            }

            self.slots[k].state = Some(state);
            self.slots[k].outputs = bufs;
            self.slots[k].trigger = trig;
        }

        for ch in out.iter_mut() {
            ch.silence();
        }
        for slot in self.slots.iter() {
            if !slot.playing {
                continue;
            }
            if let Some(assign) = &slot.route {
                for (i, buf) in slot.outputs.iter().enumerate() {
                    if let Some(dst) = out.get_mut(assign[i % assign.len()]) {
                        let n = dst.len().min(buf.len());
                        for j in 0..n {
                            dst[j] += buf[j];
                        }
                    }
                }
            }
        }
    }

    /// Poll a listener's watched trigger; run its callback once per
    /// consumed event, before dependents compute.
    fn poll_listener(&mut self, k: usize) {
        let mut listener = match self.slots[k].listener.take() {
            Some(l) => l,
            None => return,
        };
        let count = self
            .index
            .get(&listener.watch)
            .and_then(|&wk| self.slots[wk].trigger.as_ref())
            .map(|t| t.count())
            .unwrap_or(listener.seen);
        if count > listener.seen && self.slots[k].playing {
            listener.seen = count;
            let mut ctl = GraphCtl { graph: self };
            (listener.callback)(&mut ctl);
        } else {
            listener.seen = count;
        }
        // The callback cannot remove nodes, so k still addresses the
        // same slot.
        self.slots[k].listener = Some(listener);
    }
}

/// Mutation surface handed to listener callbacks.
///
/// Deliberately narrower than [`Graph`]: parameters, lifecycle, routing
/// and shared memory, but no node creation or removal - the arena must
/// keep its shape while the block evaluation is walking it.
pub struct GraphCtl<'a> {
    graph: &'a mut Graph,
}

impl<'a> GraphCtl<'a> {
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &'static str,
        value: impl Into<ParamValue>,
    ) -> Result<(), GraphError> {
        self.graph.set_param(id, name, value)
    }

    pub fn set_mul(&mut self, id: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        self.graph.set_mul(id, value)
    }

    pub fn set_add(&mut self, id: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        self.graph.set_add(id, value)
    }

    pub fn play(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.graph.play(id)
    }

    pub fn play_after(
        &mut self,
        id: NodeId,
        delay: u64,
        dur: Option<u64>,
    ) -> Result<(), GraphError> {
        self.graph.play_after(id, delay, dur)
    }

    pub fn stop(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.graph.stop(id)
    }

    pub fn get(&self, id: NodeId, stream: usize) -> Result<f32, GraphError> {
        self.graph.get(id, stream)
    }

    pub fn route(&mut self, id: NodeId, route: Route) -> Result<(), GraphError> {
        self.graph.route(id, route)
    }

    pub fn unroute(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.graph.unroute(id)
    }

    pub fn tables(&mut self) -> &mut TableStore {
        &mut self.graph.tables
    }

    pub fn matrices(&mut self) -> &mut MatrixStore {
        &mut self.graph.matrices
    }
}
