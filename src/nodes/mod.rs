//! Built-in node library.
//!
//! Every node here is a builder struct that doubles as its own
//! generator: construct it, set parameters, hand it to
//! [`Server::add`](crate::Server::add). Parameters accept anything that
//! converts into a [`ParamValue`](crate::ParamValue) - scalars, lists
//! (which expand the node's channel count), or other nodes.

pub mod arith;
pub mod effect;
pub mod matrix;
pub mod source;
pub mod table;
pub mod trig;

pub use arith::{Arith, ArithOp};
pub use effect::Port;
pub use matrix::{MatrixRead, MatrixRec};
pub use source::{Input, Noise, Phasor, Sig, Sine};
pub use table::{Osc, TableMorph, TablePlay, TableRec};
pub use trig::{Metro, TrigFunc};
