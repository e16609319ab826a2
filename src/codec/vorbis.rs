//! Ogg/Vorbis decoding via lewton

use std::fs::File;
use std::path::Path;

use lewton::inside_ogg::OggStreamReader;

use crate::error::CodecError;

use super::SoundData;

/// Decode an Ogg/Vorbis file into interleaved f32 samples.
pub fn load_vorbis(path: &Path) -> Result<SoundData, CodecError> {
    let file = File::open(path)?;
    let mut reader =
        OggStreamReader::new(file).map_err(|e| CodecError::Malformed(format!("{:?}", e)))?;
    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as usize;

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| CodecError::Malformed(format!("{:?}", e)))?
    {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(SoundData {
        samples,
        sample_rate,
        channels,
    })
}
