use crate::error::{RelayError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::time::Duration;

/// Trait for raw receiver audio sources.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read audio samples from the source.
    ///
    /// # Returns
    /// Vector of 16-bit PCM mono samples at the canonical rate, or an error.
    /// An empty vector means "nothing yet" for live sources and "exhausted"
    /// for finite ones.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// True if an empty read means the source has ended.
    fn is_finite(&self) -> bool {
        false
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Mock audio source for testing.
///
/// Plays back a fixed list of chunks, then reports end of stream.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    chunks: VecDeque<Vec<i16>>,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with no audio.
    pub fn new() -> Self {
        Self {
            is_started: false,
            chunks: VecDeque::new(),
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the chunks returned by successive reads.
    pub fn with_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.chunks = chunks.into();
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(RelayError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(RelayError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        Ok(self.chunks.pop_front().unwrap_or_default())
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Audio source fed from a channel, so tests can control timing.
///
/// Ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelAudioSource {
    rx: Receiver<Vec<i16>>,
    ended: bool,
}

impl ChannelAudioSource {
    pub fn new(rx: Receiver<Vec<i16>>) -> Self {
        Self { rx, ended: false }
    }
}

impl AudioSource for ChannelAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.ended {
            return Ok(Vec::new());
        }
        // Wait for the next chunk; skip empty chunks so only disconnect ends the stream
        loop {
            match self.rx.recv_timeout(Duration::from_millis(50)) {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => return Ok(chunk),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.ended = true;
                    return Ok(Vec::new());
                }
            }
        }
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "channel"
    }
}
