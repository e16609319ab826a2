//! CPAL device backend
//!
//! The CPAL stream runs on its own thread; the server-side `write_block`
//! feeds samples into a ring buffer that the stream consumes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::BackendError;
use crate::server::ServerConfig;

use super::Backend;

/// A discovered audio output device.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    /// The system's default output device, if any.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            device,
            config,
            name,
        })
    }

    /// All available output devices.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| {
                devices
                    .filter_map(|device| {
                        let config = device.default_output_config().ok()?;
                        let name = device.name().unwrap_or_else(|_| "Unknown".into());
                        Some(Self {
                            device,
                            config,
                            name,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Turn the device into a backend ready for [`Server::boot`](crate::Server::boot).
    pub fn into_backend(self) -> CpalBackend {
        CpalBackend {
            device: Some(self.device),
            config: Some(self.config),
            producer: None,
            samples_consumed: Arc::new(AtomicUsize::new(0)),
            had_underrun: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Backend that plays through a CPAL output stream.
pub struct CpalBackend {
    device: Option<cpal::Device>,
    config: Option<SupportedStreamConfig>,
    producer: Option<Producer<f32>>,
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
}

impl CpalBackend {
    /// Backend on the system default output device.
    pub fn default_output() -> Result<Self, BackendError> {
        CpalDevice::default_output()
            .map(CpalDevice::into_backend)
            .ok_or_else(|| BackendError::Unavailable("no default output device".into()))
    }

    /// How many samples the device has consumed so far.
    pub fn samples_consumed(&self) -> usize {
        self.samples_consumed.load(Ordering::Relaxed)
    }

    /// Check and clear the underrun flag.
    pub fn check_underrun(&self) -> bool {
        self.had_underrun.swap(false, Ordering::Relaxed)
    }
}

impl Backend for CpalBackend {
    fn open(&mut self, server_config: &ServerConfig) -> Result<(), BackendError> {
        let device = self
            .device
            .take()
            .ok_or_else(|| BackendError::Unavailable("backend already opened".into()))?;
        let config = self
            .config
            .take()
            .ok_or_else(|| BackendError::Unavailable("backend already opened".into()))?;

        let device_channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        if sample_rate as f32 != server_config.sample_rate {
            return Err(BackendError::Rejected(format!(
                "device runs at {} Hz, server configured for {} Hz",
                sample_rate, server_config.sample_rate
            )));
        }
        if device_channels < server_config.channels {
            return Err(BackendError::Rejected(format!(
                "device has {} channels, server configured for {}",
                device_channels, server_config.channels
            )));
        }

        // Ring buffer sized for ~100ms of audio to absorb scheduling
        // jitter between the block loop and the device callback.
        let buffer_samples = (sample_rate as f32 * 0.1) as usize * device_channels;
        let buffer_size = buffer_samples.next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

        let samples_consumed = self.samples_consumed.clone();
        let had_underrun = self.had_underrun.clone();

        // The stream lives on its own thread for as long as it parks.
        std::thread::spawn(move || {
            let stream = match build_stream(
                &device,
                sample_format,
                &stream_config,
                consumer,
                samples_consumed,
                had_underrun,
            ) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("failed to build output stream: {:?}", e);
                    return;
                }
            };
            if let Err(e) = stream.play() {
                tracing::error!("failed to start output stream: {:?}", e);
                return;
            }
            loop {
                std::thread::park();
            }
        });

        self.producer = Some(producer);
        tracing::debug!(sample_rate, device_channels, "cpal backend opened");
        Ok(())
    }

    fn write_block(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        let producer = self.producer.as_mut().ok_or(BackendError::NotBooted)?;
        for &s in interleaved {
            // Wait for the device to drain rather than dropping samples;
            // this is the pacing point of the block loop.
            loop {
                match producer.push(s) {
                    Ok(()) => break,
                    Err(_) => std::thread::sleep(Duration::from_micros(500)),
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.producer = None;
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| {
                let mut underrun = false;
                for sample in data.iter_mut() {
                    *sample = consumer.pop().unwrap_or_else(|_| {
                        underrun = true;
                        0.0
                    });
                }
                if underrun {
                    had_underrun.store(true, Ordering::Relaxed);
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            |err| tracing::error!("cpal stream error: {:?}", err),
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            stream_config,
            move |data: &mut [i16], _| {
                let mut underrun = false;
                for sample in data.iter_mut() {
                    let s = consumer.pop().unwrap_or_else(|_| {
                        underrun = true;
                        0.0
                    });
                    *sample = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                }
                if underrun {
                    had_underrun.store(true, Ordering::Relaxed);
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            |err| tracing::error!("cpal stream error: {:?}", err),
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            stream_config,
            move |data: &mut [u16], _| {
                let mut underrun = false;
                for sample in data.iter_mut() {
                    let s = consumer.pop().unwrap_or_else(|_| {
                        underrun = true;
                        0.0
                    });
                    *sample = ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16;
                }
                if underrun {
                    had_underrun.store(true, Ordering::Relaxed);
                }
                samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
            },
            |err| tracing::error!("cpal stream error: {:?}", err),
            None,
        ),
        other => Err({
            tracing::error!("unsupported sample format: {:?}", other);
            cpal::BuildStreamError::StreamConfigNotSupported
        }),
    }
}
