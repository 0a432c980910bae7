//! Spoken announcement played before an alert is relayed.
//!
//! Text is rendered to a transient WAV file by a [`SpeechSynthesizer`],
//! converted to canonical PCM by a [`Transcoder`], and played after the
//! lead-in tone.

use crate::alert::{ActiveAlert, header_hash, lock};
use crate::audio::pcm::{PcmBuffer, le_bytes_to_samples};
use crate::audio::playback::PlaybackSink;
use crate::error::{RelayError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// Announcement spoken for an alert heard on `monitor_id`.
pub fn announcement_text(monitor_id: usize, decoded_text: &str) -> String {
    format!(
        "May I have your attention please! An alert was just received on monitor {}. {}. \
         Please stand by. The alert is being processed and will be relayed shortly.",
        monitor_id,
        decoded_text.trim_end_matches('.')
    )
}

/// Trait for text-to-speech engines.
pub trait SpeechSynthesizer: Send {
    /// Render `text` as a WAV file at `output`.
    fn synthesize(&self, text: &str, output: &Path) -> Result<()>;

    /// Returns the engine name for logging.
    fn name(&self) -> &str;
}

/// Trait for converting audio files to canonical PCM.
pub trait Transcoder: Send {
    fn to_pcm(&self, input: &Path) -> Result<PcmBuffer>;
}

/// Runs an espeak-compatible command line.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    words_per_minute: u32,
    amplitude: u32,
}

impl CommandSynthesizer {
    pub fn new(program: &str, words_per_minute: u32, amplitude: u32) -> Self {
        Self {
            program: program.to_string(),
            words_per_minute,
            amplitude,
        }
    }

    pub fn args(&self, text: &str, output: &Path) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.words_per_minute.to_string(),
            "-a".to_string(),
            self.amplitude.to_string(),
            "-w".to_string(),
            output.display().to_string(),
            text.to_string(),
        ]
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args(self.args(text, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| RelayError::Synthesis {
                message: format!("failed to run {}: {}", self.program, e),
            })?;

        if !result.status.success() {
            return Err(RelayError::Synthesis {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Converts any ffmpeg-readable file to mono 16-bit PCM.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: &str, sample_rate: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            sample_rate,
        }
    }

    pub fn args(&self, input: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-".to_string(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn to_pcm(&self, input: &Path) -> Result<PcmBuffer> {
        let result = Command::new(&self.ffmpeg)
            .args(self.args(input))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RelayError::Transcode {
                message: format!("failed to run {}: {}", self.ffmpeg, e),
            })?;

        if !result.status.success() {
            return Err(RelayError::Transcode {
                message: format!(
                    "{} exited with {}: {}",
                    self.ffmpeg,
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }
        Ok(PcmBuffer::mono(
            le_bytes_to_samples(&result.stdout),
            self.sample_rate,
        ))
    }
}

/// Synthesizer that records requested text, for tests.
///
/// Writes the text to the output path so callers can observe file cleanup.
#[derive(Debug, Clone, Default)]
pub struct MockSynthesizer {
    spoken: Arc<Mutex<Vec<String>>>,
    should_fail: bool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts synthesized so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.spoken).clone()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        if self.should_fail {
            return Err(RelayError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        std::fs::write(output, text)?;
        lock(&self.spoken).push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Transcoder that returns a fixed buffer, for tests.
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    pcm: PcmBuffer,
    should_fail: bool,
}

impl MockTranscoder {
    pub fn new(pcm: PcmBuffer) -> Self {
        Self {
            pcm,
            should_fail: false,
        }
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new(PcmBuffer::canonical(vec![0; 240]))
    }
}

impl Transcoder for MockTranscoder {
    fn to_pcm(&self, input: &Path) -> Result<PcmBuffer> {
        if self.should_fail {
            return Err(RelayError::Transcode {
                message: format!("mock transcode failure for {}", input.display()),
            });
        }
        Ok(self.pcm.clone())
    }
}

/// Removes a file when dropped.
struct TransientFile(PathBuf);

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.0.exists()
            && let Err(e) = std::fs::remove_file(&self.0)
        {
            log::warn!("failed to remove {}: {e}", self.0.display());
        }
    }
}

/// Renders and plays announcements.
pub struct Announcer {
    synthesizer: Box<dyn SpeechSynthesizer>,
    transcoder: Box<dyn Transcoder>,
    pretone: PcmBuffer,
    work_dir: PathBuf,
}

impl Announcer {
    /// # Arguments
    /// * `pretone` - Lead-in tone, played twice before each announcement
    /// * `work_dir` - Directory for transient speech files
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        transcoder: Box<dyn Transcoder>,
        pretone: PcmBuffer,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            synthesizer,
            transcoder,
            pretone,
            work_dir,
        }
    }

    /// Render the announcement for `alert` to PCM.
    ///
    /// # Errors
    /// Returns `Synthesis` or `Transcode` errors from the collaborators.
    pub fn render(&self, alert: &ActiveAlert) -> Result<PcmBuffer> {
        let text = announcement_text(alert.monitor_id(), alert.decoded_text());
        std::fs::create_dir_all(&self.work_dir)?;

        let hash = header_hash(&text);
        let speech_file = TransientFile(
            self.work_dir
                .join(format!("announce-{}-{}.wav", alert.monitor_id(), &hash[..16])),
        );

        log::debug!(
            "[monitor {}] synthesizing announcement with {}",
            alert.monitor_id(),
            self.synthesizer.name()
        );
        self.synthesizer.synthesize(&text, &speech_file.0)?;
        self.transcoder.to_pcm(&speech_file.0)
    }

    /// Play the lead-in tone twice followed by the spoken announcement.
    pub fn announce(&self, alert: &ActiveAlert, sink: &mut dyn PlaybackSink) -> Result<()> {
        let speech = self.render(alert)?;
        log::info!("[monitor {}] announcing alert", alert.monitor_id());
        sink.play(&self.pretone)?;
        sink.play(&self.pretone)?;
        sink.play(&speech)
    }
}
