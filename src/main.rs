use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use samerelay::app::run_relay;
use samerelay::cli::{Cli, Commands};
use samerelay::config::Config;
use samerelay::diagnostics::check_dependencies;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env("SAMERELAY_LOG")
        .format_timestamp_secs()
        .init();

    match cli.command {
        None => {
            let config = load_config(&cli)?;
            if cli.soundcards.is_empty() {
                eprintln!("samerelay: at least one receiver is required (-s <DEVICE>)");
                std::process::exit(2);
            }
            log::info!("samerelay {}", samerelay::version_string());
            if let Err(e) = run_relay(config, cli.soundcards).await {
                eprintln!("samerelay: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Check) => {
            let config = load_config(&cli)?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            let config = load_config(&cli)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "samerelay",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order (later wins):
/// 1. Built-in defaults
/// 2. Config file (--config, or ~/.config/samerelay/config.toml if present)
/// 3. Environment variable overrides
/// 4. Command-line flags
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(path) = cli.config.as_deref() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let mut config = config.with_env_overrides();
    if let Some(callsign) = &cli.callsign {
        config.station.callsign = callsign.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.relay.output_dir = Some(dir.clone());
    }
    if let Some(cooldown) = cli.cooldown {
        config.relay.cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
    }
    Ok(config)
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = samerelay::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("built without CPAL support; use `ffmpeg -sources` to list devices")
}
