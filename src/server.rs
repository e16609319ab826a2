//! The server - block clock, boot/start/stop lifecycle, and the
//! control-side command queue.
//!
//! One context (usually a dedicated audio thread) owns the [`Server`]
//! and calls [`process_block`](Server::process_block) once per tick.
//! Any other thread holds the [`ControlHandle`] and mutates the running
//! graph through commands, which are drained and applied atomically at
//! the start of the next block - the audio context never observes a
//! half-updated parameter set.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::backend::Backend;
use crate::buffer::Buffer;
use crate::error::{BackendError, ConfigurationError, GraphError, TableError};
use crate::graph::{Graph, GraphCtl, Route};
use crate::matrix::{Matrix, MatrixId, MatrixStore};
use crate::node::{IntoNodeDef, NodeDef, NodeId, ParamValue, ProcessContext};
use crate::table::{Table, TableId, TableStore};

/// Fixed block-clock parameters. Validated once at [`Server::new`]; the
/// clock never changes for the server's lifetime.
#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    /// Sample rate in Hz
    pub sample_rate: f32,
    /// Physical output (and input, when duplex) channel count
    pub channels: usize,
    /// Samples per block
    pub block_size: usize,
    /// Whether the backend also provides input
    pub duplex: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            channels: 2,
            block_size: 64,
            duplex: false,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigurationError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(ConfigurationError::InvalidBlockSize(self.block_size));
        }
        if self.channels == 0 {
            return Err(ConfigurationError::InvalidChannelCount(self.channels));
        }
        Ok(())
    }
}

/// A graph mutation sent from the control context.
///
/// Commands are applied in arrival order at the next block boundary.
/// Failures at apply time (unknown node, cyclic binding) are logged and
/// counted, never allowed to stall the clock.
#[derive(Debug)]
pub enum Command {
    AddNode { id: NodeId, def: NodeDef },
    RemoveNode(NodeId),
    SetParam {
        node: NodeId,
        name: &'static str,
        value: ParamValue,
    },
    SetMul { node: NodeId, value: ParamValue },
    SetAdd { node: NodeId, value: ParamValue },
    Play(NodeId),
    PlayAfter {
        node: NodeId,
        delay: u64,
        dur: Option<u64>,
    },
    StopNode(NodeId),
    Route { node: NodeId, route: Route },
    Unroute(NodeId),
    /// Replace a table's contents wholesale. Blocking work (decoding a
    /// file, resampling) happens on the control side; only the finished
    /// data crosses the boundary.
    SetTableData { table: TableId, data: Table },
    NormalizeTable(TableId),
    Start,
    Stop,
}

/// Sends commands to a running server from another thread.
///
/// Obtained once via [`Server::handle`]. The queue is a lock-free SPSC
/// ring: this side produces, the block loop consumes.
pub struct ControlHandle {
    sender: Producer<Command>,
    ids: Arc<AtomicU32>,
}

impl ControlHandle {
    /// Send a command. Applied at the start of the next block.
    ///
    /// Returns `Err(cmd)` if the queue is full (command dropped).
    pub fn send(&mut self, cmd: Command) -> Result<(), Command> {
        self.sender.push(cmd).map_err(|rtrb::PushError::Full(c)| c)
    }

    /// Add a node from the control thread.
    ///
    /// The id is allocated immediately; the node joins the graph at the
    /// next block boundary. Binding errors surface in the server's log
    /// and fault count rather than here.
    pub fn add(&mut self, node: impl IntoNodeDef) -> Result<NodeId, Command> {
        let id = NodeId(self.ids.fetch_add(1, Ordering::Relaxed));
        self.send(Command::AddNode {
            id,
            def: node.into_def(),
        })?;
        Ok(id)
    }

    pub fn set_param(
        &mut self,
        node: NodeId,
        name: &'static str,
        value: impl Into<ParamValue>,
    ) -> Result<(), Command> {
        self.send(Command::SetParam {
            node,
            name,
            value: value.into(),
        })
    }

    pub fn play(&mut self, node: NodeId) -> Result<(), Command> {
        self.send(Command::Play(node))
    }

    pub fn stop_node(&mut self, node: NodeId) -> Result<(), Command> {
        self.send(Command::StopNode(node))
    }

    pub fn route(&mut self, node: NodeId, route: Route) -> Result<(), Command> {
        self.send(Command::Route { node, route })
    }
}

/// The scheduler: owns the graph, drives one block computation per
/// tick, and manages the backend lifecycle.
pub struct Server {
    config: ServerConfig,
    graph: Graph,
    backend: Option<Box<dyn Backend>>,
    booted: bool,
    started: bool,
    block: u64,
    out: Vec<Buffer>,
    input: Vec<Buffer>,
    interleaved_out: Vec<f32>,
    interleaved_in: Vec<f32>,
    commands: Option<Consumer<Command>>,
    handle_taken: bool,
    ids: Arc<AtomicU32>,
    dropped_commands: u64,
}

impl Server {
    /// Configure the block clock. This is the only place the sample
    /// rate, channel count and block size are set.
    pub fn new(config: ServerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let ids = Arc::new(AtomicU32::new(0));
        let input_channels = if config.duplex { config.channels } else { 0 };
        Ok(Self {
            graph: Graph::new(
                config.sample_rate,
                config.block_size,
                config.channels,
                ids.clone(),
            ),
            out: (0..config.channels)
                .map(|_| Buffer::new(config.block_size))
                .collect(),
            input: (0..input_channels)
                .map(|_| Buffer::new(config.block_size))
                .collect(),
            interleaved_out: vec![0.0; config.block_size * config.channels],
            interleaved_in: vec![0.0; config.block_size * input_channels],
            config,
            backend: None,
            booted: false,
            started: false,
            block: 0,
            commands: None,
            handle_taken: false,
            ids,
            dropped_commands: 0,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Acquire the backend. A failure here is fatal: the error is
    /// returned and the server stays stopped.
    pub fn boot(&mut self, mut backend: Box<dyn Backend>) -> Result<(), BackendError> {
        backend.open(&self.config)?;
        self.backend = Some(backend);
        self.booted = true;
        tracing::info!(
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            block_size = self.config.block_size,
            "server booted"
        );
        Ok(())
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Begin computing blocks. [`process_block`](Self::process_block)
    /// is a no-op until this is called.
    pub fn start(&mut self) -> Result<(), BackendError> {
        if !self.booted {
            return Err(BackendError::NotBooted);
        }
        self.started = true;
        tracing::info!("server started");
        Ok(())
    }

    /// Pause the compute loop. Takes effect immediately for subsequent
    /// ticks; the graph keeps its state.
    pub fn stop(&mut self) {
        self.started = false;
        tracing::info!("server stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Release the backend.
    pub fn shutdown(&mut self) {
        self.started = false;
        if let Some(mut b) = self.backend.take() {
            b.close();
        }
        self.booted = false;
        tracing::info!("server shut down");
    }

    /// The control-side command sender. The queue is single-producer:
    /// the handle can be taken exactly once.
    pub fn handle(&mut self) -> Option<ControlHandle> {
        if self.handle_taken {
            return None;
        }
        let (sender, receiver) = RingBuffer::new(256);
        self.commands = Some(receiver);
        self.handle_taken = true;
        Some(ControlHandle {
            sender,
            ids: self.ids.clone(),
        })
    }

    // ---- graph surface (owner side, applied between blocks) ----

    pub fn add(&mut self, node: impl IntoNodeDef) -> Result<NodeId, GraphError> {
        self.graph.add(node.into_def())
    }

    pub fn remove(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.graph.remove(node)
    }

    pub fn set_param(
        &mut self,
        node: NodeId,
        name: &'static str,
        value: impl Into<ParamValue>,
    ) -> Result<(), GraphError> {
        self.graph.set_param(node, name, value)
    }

    pub fn set_mul(&mut self, node: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        self.graph.set_mul(node, value)
    }

    pub fn set_add(&mut self, node: NodeId, value: impl Into<ParamValue>) -> Result<(), GraphError> {
        self.graph.set_add(node, value)
    }

    pub fn play(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.graph.play(node)
    }

    /// Start `node` after `delay` blocks, auto-stopping after `dur`
    /// blocks of activity when given.
    pub fn play_after(
        &mut self,
        node: NodeId,
        delay: u64,
        dur: Option<u64>,
    ) -> Result<(), GraphError> {
        self.graph.play_after(node, delay, dur)
    }

    pub fn stop_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.graph.stop(node)
    }

    pub fn route(&mut self, node: NodeId, route: Route) -> Result<(), GraphError> {
        self.graph.route(node, route)
    }

    pub fn unroute(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.graph.unroute(node)
    }

    pub fn routing(&self, node: NodeId) -> Option<&[usize]> {
        self.graph.routing(node)
    }

    /// Instantaneous value of one stream (last sample of its most
    /// recent block).
    pub fn get(&self, node: NodeId, stream: usize) -> Result<f32, GraphError> {
        self.graph.get(node, stream)
    }

    pub fn arity(&self, node: NodeId) -> Result<usize, GraphError> {
        self.graph.arity(node)
    }

    pub fn is_playing(&self, node: NodeId) -> Result<bool, GraphError> {
        self.graph.is_playing(node)
    }

    pub fn trigger_count(&self, node: NodeId) -> Result<u64, GraphError> {
        self.graph.trigger_count(node)
    }

    pub fn trigger_fired(&self, node: NodeId) -> Result<bool, GraphError> {
        // The "current" block is the one most recently computed.
        self.graph
            .trigger_fired(node, self.block.saturating_sub(1))
    }

    pub fn fault_count(&self) -> u64 {
        self.graph.fault_count()
    }

    /// Commands from the control handle that were rejected at apply
    /// time (unknown node, cyclic binding).
    pub fn dropped_commands(&self) -> u64 {
        self.dropped_commands
    }

    // ---- shared memory ----

    pub fn new_table(&mut self, frames: usize, chnls: usize) -> Result<TableId, TableError> {
        let t = Table::new(frames, chnls, self.config.sample_rate)?;
        Ok(self.graph.tables.insert(t))
    }

    pub fn add_table(&mut self, table: Table) -> TableId {
        self.graph.tables.insert(table)
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.graph.tables.get(id)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.graph.tables.get_mut(id)
    }

    pub fn tables_mut(&mut self) -> &mut TableStore {
        &mut self.graph.tables
    }

    pub fn new_matrix(&mut self, rows: usize, cols: usize) -> Result<MatrixId, TableError> {
        Ok(self.graph.matrices.insert(Matrix::new(rows, cols)?))
    }

    pub fn matrix(&self, id: MatrixId) -> Option<&Matrix> {
        self.graph.matrices.get(id)
    }

    pub fn matrix_mut(&mut self, id: MatrixId) -> Option<&mut Matrix> {
        self.graph.matrices.get_mut(id)
    }

    pub fn matrices_mut(&mut self) -> &mut MatrixStore {
        &mut self.graph.matrices
    }

    // ---- the block clock ----

    /// Number of blocks computed since boot.
    pub fn blocks_processed(&self) -> u64 {
        self.block
    }

    /// Physical output channels of the most recent block.
    pub fn output(&self) -> &[Buffer] {
        &self.out
    }

    /// One tick: drain commands, evaluate the graph, hand the frame to
    /// the backend.
    pub fn process_block(&mut self) -> Result<(), BackendError> {
        self.drain_commands();
        if !self.started {
            return Ok(());
        }

        if self.config.duplex {
            if let Some(backend) = self.backend.as_mut() {
                backend.read_block(&mut self.interleaved_in)?;
            }
            let channels = self.input.len();
            for (j, frame) in self.interleaved_in.chunks_exact(channels).enumerate() {
                for (c, &s) in frame.iter().enumerate() {
                    self.input[c][j] = s;
                }
            }
        }

        let ctx = ProcessContext {
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
            block: self.block,
        };
        self.graph.run_block(&ctx, &self.input, &mut self.out);

        let channels = self.config.channels;
        for j in 0..self.config.block_size {
            for c in 0..channels {
                self.interleaved_out[j * channels + c] = self.out[c][j];
            }
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.write_block(&self.interleaved_out)?;
        }

        self.block += 1;
        Ok(())
    }

    /// Run `blocks` ticks and return the interleaved output.
    pub fn render(&mut self, blocks: u64) -> Result<Vec<f32>, BackendError> {
        let mut acc = Vec::with_capacity(
            blocks as usize * self.config.block_size * self.config.channels,
        );
        for _ in 0..blocks {
            self.process_block()?;
            acc.extend_from_slice(&self.interleaved_out);
        }
        Ok(acc)
    }

    /// Run a closure against the same mutation surface listeners get.
    pub fn ctl<R>(&mut self, f: impl FnOnce(&mut GraphCtl) -> R) -> R {
        self.graph.ctl(f)
    }

    fn drain_commands(&mut self) {
        let receiver = match self.commands.as_mut() {
            Some(r) => r,
            None => return,
        };
        while let Ok(cmd) = receiver.pop() {
            match cmd {
                Command::AddNode { id, def } => {
                    if let Err(e) = self.graph.add_with_id(id, def) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "AddNode command rejected");
                    }
                }
                Command::RemoveNode(id) => {
                    if let Err(e) = self.graph.remove(id) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "RemoveNode command rejected");
                    }
                }
                Command::SetParam { node, name, value } => {
                    if let Err(e) = self.graph.set_param(node, name, value) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "SetParam command rejected");
                    }
                }
                Command::SetMul { node, value } => {
                    if let Err(e) = self.graph.set_mul(node, value) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "SetMul command rejected");
                    }
                }
                Command::SetAdd { node, value } => {
                    if let Err(e) = self.graph.set_add(node, value) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "SetAdd command rejected");
                    }
                }
                Command::Play(id) => {
                    let _ = self.graph.play(id);
                }
                Command::PlayAfter { node, delay, dur } => {
                    let _ = self.graph.play_after(node, delay, dur);
                }
                Command::StopNode(id) => {
                    let _ = self.graph.stop(id);
                }
                Command::Route { node, route } => {
                    if let Err(e) = self.graph.route(node, route) {
                        self.dropped_commands += 1;
                        tracing::warn!(%e, "Route command rejected");
                    }
                }
                Command::Unroute(id) => {
                    let _ = self.graph.unroute(id);
                }
                Command::SetTableData { table, data } => {
                    self.graph.tables.replace(table, data);
                }
                Command::NormalizeTable(id) => {
                    if let Some(t) = self.graph.tables.get_mut(id) {
                        t.normalize();
                    }
                }
                Command::Start => {
                    if self.booted {
                        self.started = true;
                    }
                }
                Command::Stop => {
                    self.started = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_configuration() {
        assert!(Server::new(ServerConfig {
            sample_rate: 0.0,
            ..Default::default()
        })
        .is_err());
        assert!(Server::new(ServerConfig {
            block_size: 0,
            ..Default::default()
        })
        .is_err());
        assert!(Server::new(ServerConfig {
            channels: 0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn start_requires_boot() {
        let mut s = Server::new(ServerConfig::default()).unwrap();
        assert!(s.start().is_err());
    }

    #[test]
    fn handle_can_only_be_taken_once() {
        let mut s = Server::new(ServerConfig::default()).unwrap();
        assert!(s.handle().is_some());
        assert!(s.handle().is_none());
    }
}
