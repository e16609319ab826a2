//! WAV read/write via hound

use std::path::Path;

use crate::error::CodecError;

use super::{SampleFormat, SoundData};

/// Read a WAV file into interleaved f32 samples.
pub fn load_wav(path: &Path) -> Result<SoundData, CodecError> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let spec = reader.spec();
    let samples: Result<Vec<f32>, _> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect(),
        (hound::SampleFormat::Int, bits) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect()
        }
        (fmt, bits) => {
            return Err(CodecError::UnsupportedFormat(format!(
                "{:?} at {} bits",
                fmt, bits
            )));
        }
    };
    Ok(SoundData {
        samples: samples.map_err(|e| CodecError::Malformed(e.to_string()))?,
        sample_rate: spec.sample_rate,
        channels: spec.channels as usize,
    })
}

/// Write interleaved f32 samples as WAV.
pub fn save_wav(path: &Path, data: &SoundData, format: SampleFormat) -> Result<(), CodecError> {
    let spec = hound::WavSpec {
        channels: data.channels as u16,
        sample_rate: data.sample_rate,
        bits_per_sample: match format {
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        },
        sample_format: match format {
            SampleFormat::Int16 => hound::SampleFormat::Int,
            SampleFormat::Float32 => hound::SampleFormat::Float,
        },
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| CodecError::Malformed(e.to_string()))?;
    match format {
        SampleFormat::Int16 => {
            for &s in &data.samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(v)
                    .map_err(|e| CodecError::Malformed(e.to_string()))?;
            }
        }
        SampleFormat::Float32 => {
            for &s in &data.samples {
                writer
                    .write_sample(s)
                    .map_err(|e| CodecError::Malformed(e.to_string()))?;
            }
        }
    }
    writer
        .finalize()
        .map_err(|e| CodecError::Malformed(e.to_string()))
}
