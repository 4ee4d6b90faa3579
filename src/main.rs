use anyhow::Result;
use clap::{CommandFactory, Parser};
use forensic_sonar::app::{Overrides, apply_overrides, run_classify_command, run_separate_command};
use forensic_sonar::cli::{Cli, Commands};
use forensic_sonar::config::Config;
use forensic_sonar::debug_log::DebugLog;
use forensic_sonar::diagnostics::check_dependencies;
use forensic_sonar::stems::JobResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            // stdout carries exactly one JSON document, even for bad arguments
            eprintln!("{}", e);
            let message = e
                .kind()
                .as_str()
                .map_or_else(|| "Invalid arguments".to_string(), |k| format!("Invalid arguments: {}", k));
            println!("{}", JobResult::error(message, DebugLog::new()).to_json());
            return Ok(());
        }
    };

    init_tracing(cli.quiet, cli.verbose);
    tracing::debug!("forensic-sonar {}", forensic_sonar::version_string());

    let overrides = Overrides {
        no_separator: cli.no_separator,
        classifier: cli.classifier,
        timeout_secs: cli.timeout,
    };

    match cli.command {
        None => {
            let Some(args) = cli.job_args() else {
                println!(
                    "{}",
                    JobResult::error("Insufficient arguments", DebugLog::new()).to_json()
                );
                return Ok(());
            };
            let config = match load_config(cli.config.as_deref()) {
                Ok(config) => apply_overrides(config, &overrides),
                Err(e) => {
                    tracing::error!("{:#}", e);
                    let message = format!("Configuration error: {:#}", e);
                    println!("{}", JobResult::error(message, DebugLog::new()).to_json());
                    return Ok(());
                }
            };
            let result = run_separate_command(&config, args).await;
            println!("{}", result.to_json());
        }
        Some(Commands::Check { output_dir }) => {
            let config = apply_overrides(load_config(cli.config.as_deref())?, &overrides);
            if !check_dependencies(&config, output_dir.as_deref()) {
                std::process::exit(1);
            }
        }
        Some(Commands::Classify { input, job_id }) => {
            let config = apply_overrides(load_config(cli.config.as_deref())?, &overrides);
            let report = run_classify_command(&config, &input, &job_id).await;
            println!("{}", serde_json::to_string(&report)?);
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "forensic-sonar",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Diagnostics go to stderr; stdout is reserved for JSON.
///
/// `RUST_LOG` wins over the verbosity flags when set.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_level = match (quiet, verbose) {
        (true, _) => "off",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        match Config::default_path() {
            Some(default_path) => Config::load_or_default(&default_path)?,
            None => Config::default(),
        }
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}
