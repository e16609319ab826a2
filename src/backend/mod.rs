//! Backend boundary - the device I/O collaborator.
//!
//! The engine never talks to a sound card directly: the server hands
//! each computed block to a [`Backend`] and, when duplex, asks it for an
//! input block first. Backends are external collaborators; the only one
//! shipped unconditionally is [`OfflineBackend`], which captures frames
//! in memory for inspection and rendering.

use crate::error::BackendError;
use crate::server::ServerConfig;

#[cfg(feature = "cpal_backend")]
mod cpal_backend;
#[cfg(feature = "cpal_backend")]
pub use cpal_backend::{CpalBackend, CpalDevice};

/// Device I/O boundary driven by the server's block clock.
///
/// `open` acquires resources and is the only fatal failure point; a
/// failure there leaves the server stopped. `write_block` receives one
/// interleaved output frame per tick, `read_block` fills one interleaved
/// input frame when the server is duplex.
pub trait Backend: Send {
    fn open(&mut self, config: &ServerConfig) -> Result<(), BackendError>;

    fn write_block(&mut self, interleaved: &[f32]) -> Result<(), BackendError>;

    /// Fill `interleaved` with one block of input. The default is
    /// silence, for output-only backends.
    fn read_block(&mut self, interleaved: &mut [f32]) -> Result<(), BackendError> {
        for s in interleaved.iter_mut() {
            *s = 0.0;
        }
        Ok(())
    }

    fn close(&mut self) {}
}

/// In-memory backend: accepts every block and keeps the interleaved
/// frames around. Used for tests, offline rendering, and as the stand-in
/// when no device backend is compiled in.
#[derive(Default)]
pub struct OfflineBackend {
    captured: Vec<f32>,
    input: Option<Vec<f32>>,
    input_pos: usize,
    open: bool,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide interleaved samples to serve as the duplex input signal.
    /// Exhausted input reads as silence.
    pub fn with_input(mut self, samples: Vec<f32>) -> Self {
        self.input = Some(samples);
        self
    }

    /// All frames written so far, interleaved.
    pub fn captured(&self) -> &[f32] {
        &self.captured
    }

    pub fn take_captured(&mut self) -> Vec<f32> {
        core::mem::take(&mut self.captured)
    }
}

impl Backend for OfflineBackend {
    fn open(&mut self, _config: &ServerConfig) -> Result<(), BackendError> {
        self.open = true;
        Ok(())
    }

    fn write_block(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        if !self.open {
            return Err(BackendError::NotBooted);
        }
        self.captured.extend_from_slice(interleaved);
        Ok(())
    }

    fn read_block(&mut self, interleaved: &mut [f32]) -> Result<(), BackendError> {
        match &self.input {
            Some(src) => {
                for s in interleaved.iter_mut() {
                    *s = src.get(self.input_pos).copied().unwrap_or(0.0);
                    self.input_pos += 1;
                }
            }
            None => {
                for s in interleaved.iter_mut() {
                    *s = 0.0;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
