//! Trigger producers and consumers

mod metro;
mod trig_func;

pub use metro::Metro;
pub use trig_func::TrigFunc;
