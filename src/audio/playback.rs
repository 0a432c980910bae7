//! Blocking audio output.
//!
//! The relay has a single broadcast output; the processor is the only caller
//! and plays one buffer at a time, so every `play` call occupies the caller
//! for the full playback duration.

use crate::alert::lock;
use crate::audio::pcm::PcmBuffer;
use crate::error::{RelayError, Result};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Trait for audio output devices.
pub trait PlaybackSink: Send {
    /// Play a buffer to completion.
    fn play(&mut self, pcm: &PcmBuffer) -> Result<()>;

    /// Returns the name of this sink for logging.
    fn name(&self) -> &'static str;
}

/// One completed `play` call recorded by [`CollectorSink`].
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub started: Instant,
    pub finished: Instant,
    pub pcm: PcmBuffer,
}

/// Sink that records what it was asked to play, for tests.
///
/// Clones share the same record, so a test can keep one clone while the
/// processor owns another.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    played: Arc<Mutex<Vec<PlaybackEvent>>>,
    play_duration: Duration,
    should_fail: bool,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for `duration` on every play, emulating device time.
    pub fn with_play_duration(mut self, duration: Duration) -> Self {
        self.play_duration = duration;
        self
    }

    /// Configure the sink to fail every play.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn played(&self) -> Vec<PlaybackEvent> {
        lock(&self.played).clone()
    }
}

impl PlaybackSink for CollectorSink {
    fn play(&mut self, pcm: &PcmBuffer) -> Result<()> {
        if self.should_fail {
            return Err(RelayError::AudioPlayback {
                message: "mock playback failure".to_string(),
            });
        }
        let started = Instant::now();
        if !self.play_duration.is_zero() {
            thread::sleep(self.play_duration);
        }
        lock(&self.played).push(PlaybackEvent {
            started,
            finished: Instant::now(),
            pcm: pcm.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Convert a buffer to interleaved f32 at the device's rate and channel count.
pub fn convert_for_device(pcm: &PcmBuffer, device_rate: u32, device_channels: u16) -> Vec<f32> {
    let channels = usize::from(pcm.channels.max(1));
    let mono: Vec<i16> = if channels == 1 {
        pcm.samples.clone()
    } else {
        pcm.samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };
    let resampled = crate::audio::wav::resample(&mono, pcm.sample_rate, device_rate);
    let out_channels = usize::from(device_channels.max(1));

    let mut out = Vec::with_capacity(resampled.len() * out_channels);
    for sample in resampled {
        let value = f32::from(sample) / 32768.0;
        out.extend(std::iter::repeat_n(value, out_channels));
    }
    out
}

#[cfg(feature = "cpal-audio")]
pub use cpal_sink::CpalPlaybackSink;

#[cfg(feature = "cpal-audio")]
mod cpal_sink {
    use super::*;
    use crate::audio::capture::with_suppressed_stderr;
    use crate::defaults::PLAYBACK_CHUNK_SAMPLES;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;

    /// Output through a CPAL device.
    ///
    /// A stream is opened per `play` call, fed in fixed-size chunks through a
    /// guarded queue the device callback drains, and closed once drained.
    pub struct CpalPlaybackSink {
        device_name: Option<String>,
    }

    impl CpalPlaybackSink {
        /// Use the named output device, or the host default for `None`.
        pub fn new(device_name: Option<String>) -> Self {
            Self { device_name }
        }

        fn device(&self) -> Result<cpal::Device> {
            with_suppressed_stderr(|| -> Result<cpal::Device> {
                let host = cpal::default_host();
                match &self.device_name {
                    None => host
                        .default_output_device()
                        .ok_or_else(|| RelayError::AudioDeviceNotFound {
                            device: "default output".to_string(),
                        }),
                    Some(name) => host
                        .output_devices()
                        .map_err(|e| RelayError::AudioPlayback {
                            message: format!("Failed to enumerate output devices: {}", e),
                        })?
                        .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                        .ok_or_else(|| RelayError::AudioDeviceNotFound {
                            device: name.clone(),
                        }),
                }
            })
        }

        fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
            device: &cpal::Device,
            config: &cpal::StreamConfig,
            queue: Arc<Mutex<VecDeque<f32>>>,
        ) -> Result<cpal::Stream> {
            device
                .build_output_stream(
                    config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        let mut queue = lock(&queue);
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(queue.pop_front().unwrap_or(0.0));
                        }
                    },
                    |err| log::error!("playback stream error: {err}"),
                    None,
                )
                .map_err(|e| RelayError::AudioPlayback {
                    message: format!("Failed to build output stream: {}", e),
                })
        }
    }

    impl PlaybackSink for CpalPlaybackSink {
        fn play(&mut self, pcm: &PcmBuffer) -> Result<()> {
            if pcm.is_empty() {
                return Ok(());
            }

            let device = self.device()?;
            let supported = device
                .default_output_config()
                .map_err(|e| RelayError::AudioPlayback {
                    message: format!("Failed to query output config: {}", e),
                })?;
            let device_rate = supported.sample_rate().0;
            let device_channels = supported.channels();
            let config: cpal::StreamConfig = supported.clone().into();

            let queue = Arc::new(Mutex::new(VecDeque::new()));
            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => {
                    Self::build_stream::<f32>(&device, &config, Arc::clone(&queue))?
                }
                cpal::SampleFormat::I16 => {
                    Self::build_stream::<i16>(&device, &config, Arc::clone(&queue))?
                }
                cpal::SampleFormat::U16 => {
                    Self::build_stream::<u16>(&device, &config, Arc::clone(&queue))?
                }
                format => {
                    return Err(RelayError::AudioPlayback {
                        message: format!("Unsupported output sample format: {:?}", format),
                    });
                }
            };
            stream.play().map_err(|e| RelayError::AudioPlayback {
                message: format!("Failed to start output stream: {}", e),
            })?;

            let samples = convert_for_device(pcm, device_rate, device_channels);
            let chunk_len = PLAYBACK_CHUNK_SAMPLES * usize::from(device_channels.max(1));
            // Keep roughly a quarter second queued ahead of the device
            let high_water = (device_rate as usize / 4) * usize::from(device_channels.max(1));
            let poll = Duration::from_millis(5);

            for chunk in samples.chunks(chunk_len) {
                while lock(&queue).len() > high_water {
                    thread::sleep(poll);
                }
                lock(&queue).extend(chunk.iter().copied());
            }
            while !lock(&queue).is_empty() {
                thread::sleep(poll);
            }
            // Let the device flush its own buffer before the stream is dropped
            thread::sleep(Duration::from_millis(100));

            drop(stream);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "cpal"
        }
    }
}
