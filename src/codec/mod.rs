//! Sound-file codec boundary - the file I/O collaborator.
//!
//! Tables persist as plain sample data plus a small header (sample
//! rate, channel count, sample format); everything else about file
//! formats lives behind this module. WAV read/write is available with
//! the `wav_codec` feature, Ogg/Vorbis decoding with `vorbis_src`.
//! Loading and saving block; they belong on the control side, never in
//! the block loop.

use crate::error::{CodecError, TableError};
use crate::table::Table;

#[cfg(feature = "vorbis_src")]
mod vorbis;
#[cfg(feature = "wav_codec")]
mod wav;

#[cfg(feature = "vorbis_src")]
pub use vorbis::load_vorbis;
#[cfg(feature = "wav_codec")]
pub use wav::{load_wav, save_wav};

/// Decoded sound data: interleaved samples plus the header fields.
#[derive(Clone, Debug)]
pub struct SoundData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl SoundData {
    /// De-interleave into a [`Table`].
    pub fn to_table(&self) -> Result<Table, TableError> {
        Table::from_interleaved(&self.samples, self.channels, self.sample_rate as f32)
    }
}

/// On-disk sample format for [`save`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Float32,
}

/// Load a sound file, dispatching on its extension.
pub fn load(path: &std::path::Path) -> Result<SoundData, CodecError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        #[cfg(feature = "wav_codec")]
        "wav" => load_wav(path),
        #[cfg(feature = "vorbis_src")]
        "ogg" => load_vorbis(path),
        other => Err(CodecError::UnsupportedFormat(other.to_string())),
    }
}

/// Save sound data, dispatching on the path's extension.
pub fn save(
    path: &std::path::Path,
    data: &SoundData,
    format: SampleFormat,
) -> Result<(), CodecError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        #[cfg(feature = "wav_codec")]
        "wav" => save_wav(path, data, format),
        other => {
            let _ = (data, format);
            Err(CodecError::UnsupportedFormat(other.to_string()))
        }
    }
}
