//! System diagnostics and dependency checking.
//!
//! Verifies that the external programs the relay drives are installed.

use crate::config::{CaptureBackend, Config};
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a command exists and answers its version flag.
fn check_command(command: &str, version_flag: &str) -> CheckResult {
    match Command::new(command).arg(version_flag).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but {} failed", command, version_flag)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// A program the relay needs, and why.
struct Requirement<'a> {
    label: &'static str,
    command: &'a str,
    version_flag: &'static str,
    purpose: &'static str,
}

fn requirements(config: &Config) -> Vec<Requirement<'_>> {
    let mut required = vec![
        Requirement {
            label: "SAME decoder",
            command: &config.tools.samedec,
            version_flag: "--version",
            purpose: "decodes alert headers from receiver audio",
        },
        Requirement {
            label: "speech synthesizer",
            command: &config.tools.espeak,
            version_flag: "--version",
            purpose: "renders spoken announcements",
        },
    ];
    // ffmpeg is needed for transcoding even when CPAL captures
    required.push(Requirement {
        label: "ffmpeg",
        command: &config.tools.ffmpeg,
        version_flag: "-version",
        purpose: if config.audio.capture == CaptureBackend::Ffmpeg {
            "captures receivers and transcodes speech"
        } else {
            "transcodes speech"
        },
    });
    required
}

/// Run all dependency checks and print results.
///
/// Returns `true` if every required program was found.
pub fn check_dependencies(config: &Config) -> bool {
    println!("Checking system dependencies...\n");

    let mut all_ok = true;
    for req in requirements(config) {
        print!("{} ({}): ", req.label, req.command);
        match check_command(req.command, req.version_flag) {
            CheckResult::Ok => println!("✓ OK"),
            CheckResult::NotFound => {
                println!("✗ NOT FOUND ({})", req.purpose);
                all_ok = false;
            }
            CheckResult::Warning(msg) => println!("⚠ WARNING: {}", msg),
        }
    }

    println!();
    if all_ok {
        println!("All required programs found.");
    } else {
        println!("Install the missing programs or point [tools] in the config at them.");
    }
    all_ok
}
