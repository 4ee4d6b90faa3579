//! System diagnostics and dependency checking.
//!
//! Verifies that the external tools a job shells out to are installed, and
//! that the output directory is writable.

use crate::config::{ClassifierBackend, Config};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues (e.g., probe exits non-zero)
    Warning(String),
}

/// Check if a command exists and answers `probe_arg`.
pub fn check_command(command: &Path, probe_arg: &str) -> CheckResult {
    match Command::new(command).arg(probe_arg).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!(
            "'{}' found but {} failed",
            command.display(),
            probe_arg
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command.display(), e)),
    }
}

/// Check that `dir` exists (creating it if needed) and accepts new files.
pub fn check_output_dir(dir: &Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::Warning(format!("cannot create {}: {}", dir.display(), e));
    }
    match tempfile::tempfile_in(dir) {
        Ok(_) => CheckResult::Ok,
        Err(e) => CheckResult::Warning(format!("{} is not writable: {}", dir.display(), e)),
    }
}

fn report(label: &str, result: &CheckResult, hint: &str) -> bool {
    print!("{}: ", label);
    match result {
        CheckResult::Ok => {
            println!("{}", "✓ OK".green());
            true
        }
        CheckResult::NotFound => {
            println!("{}", "✗ NOT FOUND".red());
            if !hint.is_empty() {
                println!("  {}", hint.dimmed());
            }
            false
        }
        CheckResult::Warning(msg) => {
            println!("{} {}", "⚠ WARNING:".yellow(), msg);
            false
        }
    }
}

/// Run all dependency checks and print results.
///
/// Returns true when every enabled stage has what it needs.
pub fn check_dependencies(config: &Config, output_dir: Option<&Path>) -> bool {
    println!("Checking forensic-sonar dependencies...\n");
    let mut ready = true;

    let ffmpeg = check_command(&config.transcoder.ffmpeg, "-version");
    if !report(
        "ffmpeg (format conversion)",
        &ffmpeg,
        "Install: sudo apt install ffmpeg  (only needed for non-WAV input)",
    ) {
        println!("  {}", "WAV input still works without it.".dimmed());
    }

    if config.separator.enabled {
        let separator = check_command(&config.separator.command, "--help");
        ready &= report(
            &format!("{} (separator, model {})", config.separator.command.display(), config.separator.model),
            &separator,
            "Install: pip install demucs",
        );
    } else {
        println!("separator: {}", "- disabled".dimmed());
    }

    match config.classifier.backend {
        ClassifierBackend::Heuristic => {
            println!("classifier: {}", "✓ built-in heuristic".green());
        }
        ClassifierBackend::None => {
            println!("classifier: {}", "- disabled (classification files only)".dimmed());
        }
        ClassifierBackend::Command => {
            if config.classifier.command.trim().is_empty() {
                println!("classifier: {}", "✗ backend is 'command' but no command is set".red());
                ready = false;
            } else {
                let result = check_command(Path::new(&config.classifier.command), "--help");
                ready &= report(
                    &format!("{} (classifier)", config.classifier.command),
                    &result,
                    "Set [classifier] command in the config file",
                );
            }
        }
    }

    if let Some(dir) = output_dir {
        ready &= report(&format!("output directory {}", dir.display()), &check_output_dir(dir), "");
    }

    println!();
    if ready {
        println!("{}", "✓ Ready to process jobs.".green());
    } else {
        println!("{}", "⚠ Some stages will fail. See above.".yellow());
    }
    ready
}
