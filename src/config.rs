use crate::defaults;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub audio: AudioConfig,
    pub relay: RelayConfig,
    pub tools: ToolsConfig,
}

/// Local station identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    /// 8-character identifier written into relayed headers
    pub callsign: String,
}

/// Capture and playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub capture: CaptureBackend,
    /// ffmpeg input format used by the ffmpeg capture backend
    pub input_format: String,
    /// Output device name; host default when unset
    pub playback_device: Option<String>,
    /// Lead-in tone WAV; a built-in chime when unset
    pub pretone: Option<PathBuf>,
    pub pretone_gain_db: f32,
}

/// How receiver audio is captured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// External ffmpeg process
    #[default]
    Ffmpeg,
    /// Native CPAL input stream
    Cpal,
}

/// Alert handling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub cooldown_ms: u64,
    pub max_recording_secs: u64,
    pub dedup_max_age_secs: u64,
    pub dedup_max_entries: usize,
    /// Archive of relayed waveforms
    pub output_dir: Option<PathBuf>,
    /// Scratch space for transient speech files
    pub work_dir: Option<PathBuf>,
}

/// External programs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub samedec: String,
    pub ffmpeg: String,
    pub espeak: String,
    /// Words per minute
    pub speech_rate: u32,
    /// espeak amplitude, 0 to 200
    pub speech_amplitude: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            callsign: defaults::DEFAULT_CALLSIGN.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            capture: CaptureBackend::default(),
            input_format: default_input_format().to_string(),
            playback_device: None,
            pretone: None,
            pretone_gain_db: defaults::PRETONE_GAIN_DB,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: defaults::COOLDOWN_MS,
            max_recording_secs: defaults::MAX_RECORDING_SECS,
            dedup_max_age_secs: defaults::DEDUP_MAX_AGE_SECS,
            dedup_max_entries: defaults::DEDUP_MAX_ENTRIES,
            output_dir: None,
            work_dir: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            samedec: "samedec".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            espeak: "espeak-ng".to_string(),
            speech_rate: defaults::SPEECH_RATE_WPM,
            speech_amplitude: defaults::SPEECH_AMPLITUDE,
        }
    }
}

fn default_input_format() -> &'static str {
    if cfg!(target_os = "windows") {
        "dshow"
    } else if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "pulse"
    }
}

impl RelayConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn max_recording(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs)
    }

    /// Configured archive directory, or `<data dir>/samerelay/alerts`.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("samerelay")
                .join("alerts")
        })
    }

    /// Configured scratch directory, or `<tmp>/samerelay`.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("samerelay"))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SAMERELAY_CALLSIGN → station.callsign
    /// - SAMERELAY_OUTPUT_DIR → relay.output_dir
    /// - SAMERELAY_PLAYBACK_DEVICE → audio.playback_device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(callsign) = std::env::var("SAMERELAY_CALLSIGN")
            && !callsign.is_empty()
        {
            self.station.callsign = callsign;
        }

        if let Ok(dir) = std::env::var("SAMERELAY_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.relay.output_dir = Some(PathBuf::from(dir));
        }

        if let Ok(device) = std::env::var("SAMERELAY_PLAYBACK_DEVICE")
            && !device.is_empty()
        {
            self.audio.playback_device = Some(device);
        }

        self
    }

    /// Check values that would otherwise fail deep inside a running relay.
    ///
    /// The callsign is validated separately, at relay startup.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if !self.audio.pretone_gain_db.is_finite() {
            return Err(invalid("audio.pretone_gain_db", "must be a finite number"));
        }
        if self.relay.max_recording_secs == 0 {
            return Err(invalid("relay.max_recording_secs", "must be positive"));
        }
        if self.relay.dedup_max_age_secs == 0 {
            return Err(invalid("relay.dedup_max_age_secs", "must be positive"));
        }
        if self.relay.dedup_max_entries == 0 {
            return Err(invalid("relay.dedup_max_entries", "must be positive"));
        }
        if self.tools.speech_rate == 0 {
            return Err(invalid("tools.speech_rate", "must be positive"));
        }
        if self.tools.speech_amplitude > 200 {
            return Err(invalid("tools.speech_amplitude", "must be at most 200"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/samerelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("samerelay")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> RelayError {
    RelayError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_samerelay_env() {
        remove_env("SAMERELAY_CALLSIGN");
        remove_env("SAMERELAY_OUTPUT_DIR");
        remove_env("SAMERELAY_PLAYBACK_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.station.callsign, "JON435  ");

        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.audio.capture, CaptureBackend::Ffmpeg);
        assert_eq!(config.audio.playback_device, None);
        assert_eq!(config.audio.pretone, None);
        assert_eq!(config.audio.pretone_gain_db, -0.5);

        assert_eq!(config.relay.cooldown(), Duration::from_secs(2));
        assert_eq!(config.relay.max_recording(), Duration::from_secs(180));
        assert_eq!(config.relay.dedup_max_age_secs, 86400);
        assert_eq!(config.relay.dedup_max_entries, 1024);

        assert_eq!(config.tools.samedec, "samedec");
        assert_eq!(config.tools.speech_rate, 135);
        assert_eq!(config.tools.speech_amplitude, 95);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [station]
            callsign = "KXYZ/FM "

            [audio]
            sample_rate = 48000
            capture = "cpal"
            playback_device = "USB Audio"
            pretone = "/srv/relay/pretone.wav"
            pretone_gain_db = -3.0

            [relay]
            cooldown_ms = 5000
            max_recording_secs = 120
            output_dir = "/srv/relay/out"

            [tools]
            samedec = "/usr/local/bin/samedec"
            speech_rate = 150
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.station.callsign, "KXYZ/FM ");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.capture, CaptureBackend::Cpal);
        assert_eq!(config.audio.playback_device, Some("USB Audio".to_string()));
        assert_eq!(
            config.audio.pretone,
            Some(PathBuf::from("/srv/relay/pretone.wav"))
        );
        assert_eq!(config.audio.pretone_gain_db, -3.0);
        assert_eq!(config.relay.cooldown(), Duration::from_secs(5));
        assert_eq!(config.relay.max_recording_secs, 120);
        assert_eq!(config.relay.output_dir(), PathBuf::from("/srv/relay/out"));
        assert_eq!(config.tools.samedec, "/usr/local/bin/samedec");
        assert_eq!(config.tools.speech_rate, 150);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [relay]
            cooldown_ms = 500
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.relay.cooldown_ms, 500);

        // Everything else should be defaults
        assert_eq!(config.station, StationConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.tools, ToolsConfig::default());
        assert_eq!(config.relay.max_recording_secs, 180);
    }

    #[test]
    fn test_unknown_capture_backend_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[audio]\ncapture = \"portaudio\"\n")
            .unwrap();
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_override_callsign() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_samerelay_env();

        set_env("SAMERELAY_CALLSIGN", "WXK27   ");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.station.callsign, "WXK27   ");
        assert_eq!(config.relay.output_dir, None); // Not overridden

        clear_samerelay_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_samerelay_env();

        set_env("SAMERELAY_CALLSIGN", "WXK27   ");
        set_env("SAMERELAY_OUTPUT_DIR", "/var/lib/samerelay");
        set_env("SAMERELAY_PLAYBACK_DEVICE", "hw:1,0");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.station.callsign, "WXK27   ");
        assert_eq!(
            config.relay.output_dir,
            Some(PathBuf::from("/var/lib/samerelay"))
        );
        assert_eq!(config.audio.playback_device, Some("hw:1,0".to_string()));

        clear_samerelay_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_samerelay_env();

        set_env("SAMERELAY_CALLSIGN", "");
        let config = Config::default().with_env_overrides();

        // Empty string should not override default
        assert_eq!(config.station.callsign, "JON435  ");

        clear_samerelay_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [relay
            cooldown_ms = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("samerelay"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_samerelay_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[station\ncallsign = ").unwrap();

        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        match config.validate() {
            Err(RelayError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "audio.sample_rate")
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_dedup_window() {
        let mut config = Config::default();
        config.relay.dedup_max_age_secs = 0;
        match config.validate() {
            Err(RelayError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "relay.dedup_max_age_secs")
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_loud_speech() {
        let mut config = Config::default();
        config.tools.speech_amplitude = 250;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_work_dir_defaults_under_temp() {
        let config = Config::default();
        assert!(config.relay.work_dir().starts_with(std::env::temp_dir()));
        assert!(config.relay.output_dir().ends_with("alerts"));
    }
}
