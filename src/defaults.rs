//! Default configuration constants for samerelay.
//!
//! Shared by the config types, the CLI and the relay components so that
//! every layer agrees on the canonical audio format and SAME framing.

use std::time::Duration;

/// Canonical PCM sample rate in Hz.
///
/// All captured, synthesized and encoded audio is 16-bit mono at this rate.
pub const SAMPLE_RATE: u32 = 24000;

/// Bytes read from a raw capture stream per feeder iteration.
pub const CAPTURE_CHUNK_BYTES: usize = 4000;

/// Samples written to the output device per playback chunk.
pub const PLAYBACK_CHUNK_SAMPLES: usize = 1024;

/// Token that marks the start of a SAME header in decoder output.
pub const START_TOKEN: &str = "ZCZC-";

/// Token that marks the end of message in decoder output.
pub const EOM_TOKEN: &str = "NNNN";

/// Quiet interval after each relayed alert, in milliseconds.
pub const COOLDOWN_MS: u64 = 2000;

/// Longest time an alert may stay in recording before it is force-closed.
///
/// SAME messages carry at most two minutes of payload; three minutes leaves
/// room for the header bursts and receiver latency.
pub const MAX_RECORDING_SECS: u64 = 180;

/// How long a relayed header is remembered for deduplication.
pub const DEDUP_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Maximum number of header hashes kept in the dedup record.
pub const DEDUP_MAX_ENTRIES: usize = 1024;

/// Gain applied to the lead-in tone, in dB.
pub const PRETONE_GAIN_DB: f32 = -0.5;

/// Speech rate passed to the synthesizer (words per minute).
pub const SPEECH_RATE_WPM: u32 = 135;

/// Synthesizer amplitude (espeak scale, 0-200). 95% of the default 100.
pub const SPEECH_AMPLITUDE: u32 = 95;

/// Exact length of a station callsign.
pub const CALLSIGN_LEN: usize = 8;

/// Punctuation allowed in a station callsign in addition to ASCII letters and digits.
pub const CALLSIGN_PUNCTUATION: &str = "-+?()[]._,/ ";

/// Default station callsign when none is configured.
pub const DEFAULT_CALLSIGN: &str = "JON435  ";

/// Convenience accessor for the cooldown as a [`Duration`].
pub fn cooldown() -> Duration {
    Duration::from_millis(COOLDOWN_MS)
}
