//! Command-line interface for forensic-sonar
//!
//! Provides argument parsing using clap derive macros.

use crate::config::ClassifierBackend;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Forensic audio analysis: stem separation and event-masked stems
///
/// `forensic-sonar <input> <output_dir> <job_id> [classification]` writes
/// exactly one JSON document to stdout.
#[derive(Parser, Debug)]
#[command(
    name = "forensic-sonar",
    version,
    about = "Forensic audio analysis: stem separation and event-masked stems",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Audio file to analyse (WAV, or anything ffmpeg can read)
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Directory stems are written under
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Job identifier, used to scope output directories
    #[arg(value_name = "JOB_ID")]
    pub job_id: Option<String>,

    /// Classification JSON with soundEvents to mask
    #[arg(value_name = "CLASSIFICATION")]
    pub classification: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress diagnostics on stderr (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose diagnostics on stderr (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Skip source separation
    #[arg(long)]
    pub no_separator: bool,

    /// Classifier used when no classification file is given
    #[arg(long, value_enum, global = true, value_name = "BACKEND")]
    pub classifier: Option<ClassifierBackend>,

    /// Per-stage timeout override. Examples: 90, 30s, 10m, 1h30m
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout_secs)]
    pub timeout: Option<u64>,
}

/// Parse a timeout duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_timeout_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → seconds
    let secs = match s.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs())
            .map_err(|e| e.to_string())?,
    };
    if secs == 0 {
        return Err("timeout must be at least one second".to_string());
    }
    Ok(secs)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check external tools and output directory
    Check {
        /// Output directory to probe for write access
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Detect sound events in a file and print the classification JSON
    Classify {
        /// Audio file to classify
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Job identifier recorded in the report
        #[arg(long, value_name = "ID", default_value = "job")]
        job_id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Positional job arguments, present only when all three required ones are.
#[derive(Debug, Clone, PartialEq)]
pub struct JobArgs {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub job_id: String,
    pub classification: Option<PathBuf>,
}

impl Cli {
    /// Collect the positional job arguments.
    ///
    /// Returns `None` when any of input, output directory or job id is missing.
    pub fn job_args(&self) -> Option<JobArgs> {
        Some(JobArgs {
            input: self.input.clone()?,
            output_dir: self.output_dir.clone()?,
            job_id: self.job_id.clone()?,
            classification: self.classification.clone(),
        })
    }
}
