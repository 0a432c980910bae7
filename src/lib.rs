//! samerelay - EAS/SAME alert relay for weather radio receivers
//!
//! Listens to one or more receivers, announces each new alert, and relays it
//! with the local station callsign.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod alert;
pub mod announce;
pub mod audio;
pub mod callsign;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod dedup;
pub mod defaults;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod monitor;
pub mod processor;
pub mod queue;
pub mod relay;
pub mod store;

// Composition root - needs everything
pub mod app;

// Collaborator traits (source → decode → announce → encode → sink)
pub use alert::HeaderDescriber;
pub use announce::{SpeechSynthesizer, Transcoder};
pub use audio::{AudioSource, PlaybackSink};
pub use decoder::MarkerDecoder;
pub use encoder::AlertEncoder;

// Core
pub use alert::{ActiveAlert, RecordingEnd};
pub use callsign::Callsign;
pub use dedup::AlertDeduper;
pub use monitor::MonitorCapture;
pub use processor::AlertProcessor;
pub use queue::AlertQueue;
pub use relay::{Collaborators, MonitorInput, RelayHandle, RelaySettings};

// Error handling
pub use error::{RelayError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_carries_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", hash_part);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
