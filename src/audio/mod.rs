//! Audio capture, playback and WAV handling.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod command;
pub mod pcm;
pub mod playback;
pub mod recorder;
pub mod tone;
pub mod wav;

pub use pcm::PcmBuffer;
pub use playback::{CollectorSink, PlaybackSink};
pub use recorder::AudioSource;
