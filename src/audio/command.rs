//! Receiver capture through an external `ffmpeg` process.
//!
//! Useful where CPAL cannot see the receiver (DirectShow names, remote
//! streams, `-f lavfi` test sources). ffmpeg writes raw s16le mono PCM to its
//! stdout, which is read in fixed-size chunks.

use crate::audio::pcm::le_bytes_to_samples;
use crate::audio::recorder::AudioSource;
use crate::defaults::CAPTURE_CHUNK_BYTES;
use crate::error::{RelayError, Result};
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

/// How to launch the capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub ffmpeg: String,
    /// ffmpeg input format (`pulse`, `alsa`, `dshow`, ...).
    pub input_format: String,
    pub device: String,
    pub sample_rate: u32,
}

impl CaptureCommand {
    /// Arguments passed to ffmpeg.
    pub fn args(&self) -> Vec<String> {
        let input = if self.input_format == "dshow" {
            format!("audio={}", self.device)
        } else {
            self.device.clone()
        };
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-i".to_string(),
            input,
            "-f".to_string(),
            "s16le".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-".to_string(),
        ]
    }
}

/// Audio source backed by an ffmpeg child process.
pub struct CommandAudioSource {
    command: CaptureCommand,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    /// Odd byte left over from the previous read.
    carry: Option<u8>,
}

impl CommandAudioSource {
    pub fn new(command: CaptureCommand) -> Self {
        Self {
            command,
            child: None,
            stdout: None,
            carry: None,
        }
    }
}

impl AudioSource for CommandAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        log::debug!(
            "launching {} {}",
            self.command.ffmpeg,
            self.command.args().join(" ")
        );
        let mut child = Command::new(&self.command.ffmpeg)
            .args(self.command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RelayError::AudioCapture {
                message: format!("Failed to launch {}: {}", self.command.ffmpeg, e),
            })?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                log::debug!("capture process for {} already gone: {e}", self.command.device);
            }
            child.wait()?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(RelayError::AudioCapture {
                message: "capture process not started".to_string(),
            });
        };

        let mut chunk = vec![0u8; CAPTURE_CHUNK_BYTES];
        let offset = match self.carry.take() {
            Some(byte) => {
                chunk[0] = byte;
                1
            }
            None => 0,
        };

        let read = stdout
            .read(&mut chunk[offset..])
            .map_err(|e| RelayError::AudioCapture {
                message: format!("Failed to read capture stream: {}", e),
            })?;
        if read == 0 {
            return Ok(Vec::new());
        }

        let filled = offset + read;
        if filled % 2 == 1 {
            self.carry = Some(chunk[filled - 1]);
        }
        Ok(le_bytes_to_samples(&chunk[..filled]))
    }

    fn is_finite(&self) -> bool {
        // Reads block; an empty read only happens at end of stream
        true
    }

    fn name(&self) -> &str {
        &self.command.device
    }
}

impl Drop for CommandAudioSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("failed to stop capture process: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(format: &str, device: &str) -> CaptureCommand {
        CaptureCommand {
            ffmpeg: "ffmpeg".to_string(),
            input_format: format.to_string(),
            device: device.to_string(),
            sample_rate: 24000,
        }
    }

    #[test]
    fn args_request_canonical_pcm() {
        let args = command("pulse", "receiver.monitor").args();
        let joined = args.join(" ");
        assert!(joined.contains("-f pulse -i receiver.monitor"));
        assert!(joined.contains("-f s16le -c:a pcm_s16le -ar 24000 -ac 1 -"));
    }

    #[test]
    fn dshow_devices_get_audio_prefix() {
        let args = command("dshow", "Line In (USB)").args();
        assert!(args.contains(&"audio=Line In (USB)".to_string()));
    }

    #[test]
    fn read_before_start_is_an_error() {
        let mut source = CommandAudioSource::new(command("alsa", "hw:1"));
        assert!(matches!(
            source.read_samples(),
            Err(RelayError::AudioCapture { .. })
        ));
    }

    #[test]
    fn missing_binary_fails_to_start() {
        let mut source = CommandAudioSource::new(CaptureCommand {
            ffmpeg: "/nonexistent/ffmpeg-binary".to_string(),
            ..command("alsa", "hw:1")
        });
        assert!(source.start().is_err());
    }
}
