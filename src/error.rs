//! Error types surfaced by the engine

use crate::matrix::MatrixId;
use crate::node::NodeId;
use crate::table::TableId;
use thiserror::Error;

/// Rejected server configuration. Raised synchronously by [`Server::new`](crate::Server::new).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f32),
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("invalid channel count: {0}")]
    InvalidChannelCount(usize),
}

/// Backend (device) failure. Fatal at boot: the server stays stopped.
#[derive(Clone, Debug, Error)]
pub enum BackendError {
    #[error("no backend has been booted")]
    NotBooted,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected configuration: {0}")]
    Rejected(String),
    #[error("backend stream error: {0}")]
    Stream(String),
}

/// Structural graph errors, rejected at bind time and never silently resolved.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("stream {stream} out of range for node {node:?} (arity {arity})")]
    StreamOutOfRange {
        node: NodeId,
        stream: usize,
        arity: usize,
    },
    #[error("node {node:?} has no parameter named {name:?}")]
    UnknownParam { node: NodeId, name: &'static str },
    #[error("binding would create a cyclic dependency")]
    CyclicDependency,
    #[error("unknown table {0:?}")]
    UnknownTable(TableId),
    #[error("unknown matrix {0:?}")]
    UnknownMatrix(MatrixId),
}

/// A per-block generator failure.
///
/// Contained by the scheduler: the node is skipped for that block, its
/// streams hold their last values, and the fault is counted and logged.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum NodeFault {
    #[error("table {0:?} is gone")]
    TableMissing(TableId),
    #[error("matrix {0:?} is gone")]
    MatrixMissing(MatrixId),
    #[error("{0}")]
    BadState(&'static str),
}

/// Table and matrix construction/edit errors.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TableError {
    #[error("table length must be nonzero")]
    ZeroLength,
    #[error("channel count must be nonzero")]
    ZeroChannels,
    #[error("morph needs at least two source tables")]
    TooFewSources,
    #[error("morph sources must share the destination's length")]
    SourceLengthMismatch,
    #[error("morph destination cannot be one of its sources")]
    SelfSource,
    #[error("curve needs at least two anchor points")]
    TooFewAnchors,
}

/// Sound-file codec errors (external collaborator boundary).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("malformed file: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
