//! strom - a block-synchronous signal graph runtime
//!
//! A [`Server`] drives a fixed block clock; an arena of nodes computes
//! one buffer per stream per tick, in dependency order. The graph can be
//! rebuilt while it runs.
//!
//! Design principles:
//! - Each server has a fixed sample rate, block size and channel count
//! - Node parameters are values, lists, or other nodes; lists expand
//!   the node into parallel streams with cyclic wraparound
//! - Cross-thread control goes through a message ring buffer applied at
//!   block boundaries - no locks on the audio thread
//! - All cross-node references are stable integer ids in one arena
//! - Triggers are one-block pulses, distinct from the audio streams
//! - Tables and matrices are shared sample memory on the same clock
//!
//! # Example
//!
//! ```
//! use strom::nodes::Sine;
//! use strom::{OfflineBackend, Route, Server, ServerConfig};
//!
//! let mut server = Server::new(ServerConfig {
//!     sample_rate: 44100.0,
//!     channels: 2,
//!     block_size: 64,
//!     duplex: false,
//! })
//! .unwrap();
//! server.boot(Box::new(OfflineBackend::new())).unwrap();
//!
//! // Two detuned streams, routed to the two output channels.
//! let osc = server.add(Sine::new().freq([220.0, 221.0]).mul(0.25)).unwrap();
//! server.route(osc, Route::default()).unwrap();
//!
//! server.start().unwrap();
//! for _ in 0..16 {
//!     server.process_block().unwrap();
//! }
//! ```

pub mod backend;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod graph;
pub mod matrix;
pub mod node;
pub mod nodes;
pub mod server;
pub mod table;
pub mod trigger;

pub use backend::{Backend, OfflineBackend};
pub use buffer::Buffer;
pub use error::{
    BackendError, CodecError, ConfigurationError, GraphError, NodeFault, TableError,
};
pub use graph::{Graph, GraphCtl, Route};
pub use matrix::{Matrix, MatrixId, MatrixStore};
pub use node::{
    Generator, Inputs, IntoNodeDef, NodeDef, NodeId, Outputs, ParamValue, ParamView,
    ProcessContext, Resources,
};
pub use server::{Command, ControlHandle, Server, ServerConfig};
pub use table::{
    AddressMode, CurveStrategy, HermiteCurve, Interp, Interpolator, Table, TableId, TableStore,
};
pub use trigger::TriggerChannel;

#[cfg(feature = "cpal_backend")]
pub use backend::{CpalBackend, CpalDevice};
