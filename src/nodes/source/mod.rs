//! Signal sources

mod input;
mod noise;
mod phasor;
mod sig;
mod sine;

pub use input::Input;
pub use noise::Noise;
pub use phasor::Phasor;
pub use sig::Sig;
pub use sine::Sine;
