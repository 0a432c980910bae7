//! Receiver audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::recorder::AudioSource;
use crate::audio::wav::resample;
use crate::error::{RelayError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Device name that selects the host's default input.
pub const DEFAULT_DEVICE: &str = "default";

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Device name patterns that are never receiver inputs.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "center:", "side:", "HDMI"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// List capture devices usable as receiver inputs.
///
/// # Errors
/// Returns `RelayError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices()).map_err(|e| {
        RelayError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        }
    })?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .filter(|name| !should_filter_device(name))
        .collect())
}

/// Find an input device by exact name, or the host default for `"default"`.
pub(crate) fn find_input_device(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        if name == DEFAULT_DEVICE {
            return host
                .default_input_device()
                .ok_or_else(|| RelayError::AudioDeviceNotFound {
                    device: name.to_string(),
                });
        }

        let devices = host
            .input_devices()
            .map_err(|e| RelayError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        for device in devices {
            if let Ok(dev_name) = device.name()
                && dev_name == name
            {
                return Ok(device);
            }
        }

        Err(RelayError::AudioDeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the owning feeder thread, through
/// the Mutex in CpalAudioSource.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Receiver capture from a named input device.
///
/// Delivers 16-bit mono PCM at the canonical rate. Tries i16/mono at the
/// target rate first, then falls back to the device's native config with
/// software channel mixing and resampling.
pub struct CpalAudioSource {
    device_name: String,
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Open the named input device.
    ///
    /// # Errors
    /// Returns `RelayError::AudioDeviceNotFound` if no device has that name.
    pub fn new(device_name: &str, sample_rate: u32) -> Result<Self> {
        let device = find_input_device(device_name)?;
        Ok(Self {
            device_name: device_name.to_string(),
            device,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate,
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_name = self.device_name.clone();
        let err_callback = move |err| {
            log::error!("capture stream error on {device_name}: {err}");
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback.clone(),
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Build a stream at the device's native config and convert in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| RelayError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        log::info!(
            "{}: using native capture format ({}ch/{}Hz/{:?}), converting in software",
            self.device_name,
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let device_name = self.device_name.clone();
        let err_callback = move |err| {
            log::error!("capture stream error on {device_name}: {err}");
        };
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        let stream = match default_config.sample_format() {
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let converted = to_mono(data, native_channels, native_rate, target_rate);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&converted);
                    }
                },
                err_callback,
                None,
            ),
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let i16_data: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let converted = to_mono(&i16_data, native_channels, native_rate, target_rate);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&converted);
                    }
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(RelayError::AudioCapture {
                    message: format!("Unsupported native sample format: {:?}", fmt),
                });
            }
        };

        stream.map_err(|e| RelayError::AudioCapture {
            message: format!("Failed to build native capture stream: {}", e),
        })
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn to_mono(samples: &[i16], channels: usize, source_rate: u32, target_rate: u32) -> Vec<i16> {
    let mono: Vec<i16> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };
    resample(&mono, source_rate, target_rate)
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| RelayError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        if stream_guard.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| RelayError::AudioCapture {
            message: format!("Failed to start capture stream: {}", e),
        })?;

        // Some PipeWire-ALSA setups accept non-native configs but never fire the callback
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            let native_stream = self.build_stream_native()?;
            native_stream
                .play()
                .map_err(|e| RelayError::AudioCapture {
                    message: format!("Failed to start native capture stream: {}", e),
                })?;
            native_stream
        } else {
            stream
        };

        *stream_guard = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| RelayError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| RelayError::AudioCapture {
                    message: format!("Failed to stop capture stream: {}", e),
                })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self.buffer.lock().map_err(|e| RelayError::AudioCapture {
            message: format!("Failed to lock capture buffer: {}", e),
        })?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("USB Audio CODEC"));
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = vec![100i16, 300, -200, 200];
        assert_eq!(to_mono(&stereo, 2, 24000, 24000), vec![200, 0]);
    }

    #[test]
    fn test_to_mono_resamples() {
        let mono = vec![0i16; 48000];
        assert_eq!(to_mono(&mono, 1, 48000, 24000).len(), 24000);
    }

    #[test]
    fn test_create_with_invalid_device_name() {
        match CpalAudioSource::new("NonExistentReceiver12345", 24000) {
            Err(RelayError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentReceiver12345");
            }
            Err(RelayError::AudioCapture { .. }) => {
                // No audio backend available in this environment
            }
            Ok(_) => panic!("Expected AudioDeviceNotFound error"),
            Err(other) => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_default_device_starts_and_stops() {
        let mut source = CpalAudioSource::new(DEFAULT_DEVICE, 24000).expect("default input");
        assert!(source.start().is_ok());
        assert!(source.read_samples().is_ok());
        assert!(source.stop().is_ok());
    }
}
