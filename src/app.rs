//! Relay application entry point.
//!
//! Builds production collaborators from the configuration and runs the relay
//! until interrupted.

use crate::alert::SameDescriber;
use crate::announce::{CommandSynthesizer, FfmpegTranscoder};
use crate::audio::command::{CaptureCommand, CommandAudioSource};
use crate::audio::playback::PlaybackSink;
use crate::audio::recorder::AudioSource;
use crate::audio::wav::WavAudioSource;
use crate::config::{CaptureBackend, Config};
use crate::decoder::SamedecDecoder;
use crate::encoder::SameEncoder;
use crate::error::{RelayError, Result};
use crate::relay::{self, Collaborators, MonitorInput, RelayHandle, RelaySettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Device-name prefix that replays a WAV file instead of capturing.
pub const FILE_PREFIX: &str = "file:";

/// Build the audio source for one receiver.
///
/// `file:<path>` replays a WAV recording; anything else is a capture device
/// opened with the configured backend.
pub fn build_source(config: &Config, device: &str) -> Result<Box<dyn AudioSource>> {
    if let Some(path) = device.strip_prefix(FILE_PREFIX) {
        return Ok(Box::new(WavAudioSource::open(Path::new(path))?));
    }

    match config.audio.capture {
        CaptureBackend::Ffmpeg => Ok(Box::new(CommandAudioSource::new(CaptureCommand {
            ffmpeg: config.tools.ffmpeg.clone(),
            input_format: config.audio.input_format.clone(),
            device: device.to_string(),
            sample_rate: config.audio.sample_rate,
        }))),
        #[cfg(feature = "cpal-audio")]
        CaptureBackend::Cpal => Ok(Box::new(crate::audio::capture::CpalAudioSource::new(
            device,
            config.audio.sample_rate,
        )?)),
        #[cfg(not(feature = "cpal-audio"))]
        CaptureBackend::Cpal => Err(RelayError::ConfigInvalidValue {
            key: "audio.capture".to_string(),
            message: "built without CPAL support".to_string(),
        }),
    }
}

/// Output sink for the configured playback device.
pub fn build_sink(config: &Config) -> Result<Box<dyn PlaybackSink>> {
    #[cfg(feature = "cpal-audio")]
    {
        Ok(Box::new(crate::audio::playback::CpalPlaybackSink::new(
            config.audio.playback_device.clone(),
        )))
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        let _device = &config.audio.playback_device;
        Err(RelayError::AudioPlayback {
            message: "built without CPAL support, no playback device available".to_string(),
        })
    }
}

/// Production collaborators: samedec-style describer, espeak, ffmpeg and
/// the native SAME encoder.
pub fn build_collaborators(config: &Config) -> Result<Collaborators> {
    Ok(Collaborators {
        describer: Arc::new(SameDescriber),
        synthesizer: Box::new(CommandSynthesizer::new(
            &config.tools.espeak,
            config.tools.speech_rate,
            config.tools.speech_amplitude,
        )),
        transcoder: Box::new(FfmpegTranscoder::new(
            &config.tools.ffmpeg,
            config.audio.sample_rate,
        )),
        encoder: Box::new(SameEncoder::new(config.audio.sample_rate)),
        sink: build_sink(config)?,
    })
}

/// Open every receiver device with a samedec decoder.
///
/// A device whose source cannot be built is logged and skipped. The others
/// keep their position on the command line as their receiver number.
pub fn build_monitors(config: &Config, devices: &[String]) -> Vec<MonitorInput> {
    let mut monitors = Vec::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        let id = index + 1;
        match build_source(config, device) {
            Ok(source) => monitors.push(MonitorInput {
                id,
                source,
                decoder: Box::new(SamedecDecoder::new(
                    &config.tools.samedec,
                    config.audio.sample_rate,
                )),
            }),
            Err(e) => log::error!("[monitor {id}] cannot open {device}: {e}"),
        }
    }
    monitors
}

/// Start the relay on the given receiver devices.
///
/// # Errors
/// Returns an error for an invalid configuration or callsign, or if no
/// receiver can be opened.
pub fn start_relay(config: &Config, devices: &[String]) -> Result<RelayHandle> {
    config.validate()?;
    let settings = RelaySettings::from_config(config);
    // Fail on a bad callsign before touching any device
    crate::callsign::Callsign::parse(&settings.callsign)?;

    #[cfg(feature = "cpal-audio")]
    crate::audio::capture::suppress_audio_warnings();

    let monitors = build_monitors(config, devices);
    if monitors.is_empty() && !devices.is_empty() {
        return Err(RelayError::AudioCapture {
            message: "no receiver could be opened".to_string(),
        });
    }

    relay::start(settings, monitors, build_collaborators(config)?)
}

/// Run the relay until Ctrl-C, or until every receiver has stopped and the
/// queue is drained.
pub async fn run_relay(config: Config, devices: Vec<String>) -> Result<()> {
    let handle = start_relay(&config, &devices)?;
    let poll = Duration::from_millis(250);

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("failed to listen for Ctrl-C: {e}");
            }
            true
        }
        _ = async {
            while !handle.monitors_finished() {
                tokio::time::sleep(poll).await;
            }
        } => false,
    };

    // Joining blocks on worker threads
    let shutdown = tokio::task::spawn_blocking(move || {
        if interrupted {
            handle.stop();
        } else {
            log::info!("all receivers stopped, relaying remaining alerts");
            handle.wait();
        }
    });
    shutdown
        .await
        .map_err(|e| RelayError::Other(format!("shutdown task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::PcmBuffer;
    use crate::audio::wav::write_wav;

    #[test]
    fn file_prefix_selects_wav_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rx.wav");
        write_wav(
            std::fs::File::create(&path).unwrap(),
            &PcmBuffer::canonical(vec![1; 10]),
        )
        .unwrap();

        let mut source =
            build_source(&Config::default(), &format!("file:{}", path.display())).unwrap();
        assert_eq!(source.read_samples().unwrap().len(), 10);
    }

    #[test]
    fn missing_replay_file_errors() {
        let result = build_source(&Config::default(), "file:/nonexistent/rx.wav");
        assert!(matches!(result, Err(RelayError::AudioDeviceNotFound { .. })));
    }

    #[test]
    fn ffmpeg_backend_builds_command_source() {
        let source = build_source(&Config::default(), "alsa_input.usb").unwrap();
        assert_eq!(source.name(), "alsa_input.usb");
    }

    #[test]
    fn invalid_callsign_rejected_before_devices_open() {
        let mut config = Config::default();
        config.station.callsign = "BAD".to_string();
        let result = start_relay(&config, &["file:/nonexistent/rx.wav".to_string()]);
        assert!(matches!(result, Err(RelayError::InvalidCallsign { .. })));
    }

    #[test]
    fn unopened_receiver_keeps_later_receiver_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("rx.wav");
        write_wav(
            std::fs::File::create(&good).unwrap(),
            &PcmBuffer::canonical(vec![0; 10]),
        )
        .unwrap();

        let devices = vec![
            "file:/nonexistent/missing.wav".to_string(),
            format!("file:{}", good.display()),
        ];
        let monitors = build_monitors(&Config::default(), &devices);
        let ids: Vec<usize> = monitors.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = Config::default();
        config.relay.dedup_max_entries = 0;
        let result = start_relay(&config, &["file:/x.wav".to_string()]);
        assert!(matches!(result, Err(RelayError::ConfigInvalidValue { .. })));
    }
}
