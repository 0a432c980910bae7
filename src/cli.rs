//! Command-line interface for samerelay
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// EAS/SAME alert relay for weather radio receivers
#[derive(Parser, Debug)]
#[command(
    name = "samerelay",
    version,
    about = "Relay EAS/SAME alerts from receivers to a local broadcast output"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Receiver input device; repeat for each receiver. `file:<path>` replays a WAV
    #[arg(short = 's', long = "soundcard", value_name = "DEVICE")]
    pub soundcards: Vec<String>,

    /// Station callsign written into relayed headers (exactly 8 characters)
    #[arg(long, value_name = "ID")]
    pub callsign: Option<String>,

    /// Directory for relayed waveforms
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Quiet interval between relayed alerts. Examples: 2s, 500ms, 1m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub cooldown: Option<Duration>,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`; a bare number is
/// taken as seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Check that the external programs are installed
    Check,

    /// Show the effective configuration
    Config,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Log filter implied by -q / -v.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Warn;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_soundcards() {
        let cli = Cli::parse_from(["samerelay", "-s", "hw:1,0", "--soundcard", "hw:2,0"]);
        assert_eq!(cli.soundcards, vec!["hw:1,0", "hw:2,0"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "samerelay",
            "-s",
            "file:rx.wav",
            "--callsign",
            "KXYZ/FM ",
            "--output-dir",
            "/srv/out",
            "--cooldown",
            "5s",
        ]);
        assert_eq!(cli.callsign.as_deref(), Some("KXYZ/FM "));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/srv/out")));
        assert_eq!(cli.cooldown, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("3"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::parse_from(["samerelay", "-q"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
        let cli = Cli::parse_from(["samerelay", "-vv"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Trace);
        let cli = Cli::parse_from(["samerelay"]);
        assert_eq!(cli.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from(["samerelay", "devices"]);
        assert!(matches!(cli.command, Some(Commands::Devices)));
        let cli = Cli::parse_from(["samerelay", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }
}
