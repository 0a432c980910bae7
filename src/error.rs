//! Error types for samerelay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    // Startup validation
    #[error("Invalid station callsign {callsign:?}: {reason}")]
    InvalidCallsign { callsign: String, reason: String },

    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture errors (terminate a single monitor)
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("SAME decoder pipe error: {message}")]
    DecoderPipe { message: String },

    // Announcement errors (logged, alert continues)
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Audio transcoding failed: {message}")]
    Transcode { message: String },

    // Relay output errors
    #[error("Alert encoding failed: {message}")]
    Encode { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_callsign_display() {
        let error = RelayError::InvalidCallsign {
            callsign: "KXYZ".to_string(),
            reason: "must be exactly 8 characters, got 4".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid station callsign \"KXYZ\": must be exactly 8 characters, got 4"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = RelayError::ConfigInvalidValue {
            key: "relay.cooldown_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for relay.cooldown_ms: must be positive"
        );
    }

    #[test]
    fn test_audio_device_not_found_display() {
        let error = RelayError::AudioDeviceNotFound {
            device: "hw:2,0".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: hw:2,0");
    }

    #[test]
    fn test_decoder_pipe_display() {
        let error = RelayError::DecoderPipe {
            message: "broken pipe".to_string(),
        };
        assert_eq!(error.to_string(), "SAME decoder pipe error: broken pipe");
    }

    #[test]
    fn test_synthesis_display() {
        let error = RelayError::Synthesis {
            message: "espeak-ng not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Speech synthesis failed: espeak-ng not found"
        );
    }

    #[test]
    fn test_transcode_display() {
        let error = RelayError::Transcode {
            message: "ffmpeg exited with status 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio transcoding failed: ffmpeg exited with status 1"
        );
    }

    #[test]
    fn test_encode_display() {
        let error = RelayError::Encode {
            message: "empty header".to_string(),
        };
        assert_eq!(error.to_string(), "Alert encoding failed: empty header");
    }

    #[test]
    fn test_audio_playback_display() {
        let error = RelayError::AudioPlayback {
            message: "no output device".to_string(),
        };
        assert_eq!(error.to_string(), "Audio playback failed: no output device");
    }

    #[test]
    fn test_other_display() {
        let error = RelayError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error: RelayError = io_error.into();
        assert!(error.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: RelayError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: RelayError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RelayError>();
        assert_sync::<RelayError>();
    }
}
