//! Signal-shaping effects

mod port;

pub use port::Port;
