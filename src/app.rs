//! Application entry points.
//!
//! Builds collaborators from [`Config`] and runs the two job-shaped commands:
//! a full separation job and a classification-only pass.

use crate::audio::{FfmpegTranscoder, TranscodeTarget, WaveformStore, load_or_transcode};
use crate::classify::{Classifies, CommandClassifier, HeuristicClassifier, detect_events};
use crate::cli::JobArgs;
use crate::config::{ClassifierBackend, ClassifierConfig, Config};
use crate::debug_log::DebugLog;
use crate::events::ClassificationReport;
use crate::job::{ForensicPipeline, Job, JobId};
use crate::masker::ForensicMasker;
use crate::separate::DemucsCommandSeparator;
use crate::stems::JobResult;
use std::path::Path;
use std::time::Duration;

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub no_separator: bool,
    pub classifier: Option<ClassifierBackend>,
    /// Replaces every stage timeout, in seconds.
    pub timeout_secs: Option<u64>,
}

/// Apply CLI overrides to a configuration.
pub fn apply_overrides(mut config: Config, overrides: &Overrides) -> Config {
    if overrides.no_separator {
        config.separator.enabled = false;
    }
    if let Some(backend) = overrides.classifier {
        config.classifier.backend = backend;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.transcoder.timeout_secs = secs;
        config.separator.timeout_secs = secs;
        config.classifier.timeout_secs = secs;
    }
    config
}

/// Build the configured classifier, if any.
pub fn build_classifier(config: &ClassifierConfig) -> Option<Box<dyn Classifies>> {
    match config.backend {
        ClassifierBackend::Heuristic => Some(Box::new(HeuristicClassifier::new())),
        ClassifierBackend::Command => Some(Box::new(CommandClassifier::new(
            config.command.clone(),
            config.args.clone(),
            config.timeout(),
        ))),
        ClassifierBackend::None => None,
    }
}

fn build_transcoder(config: &Config) -> FfmpegTranscoder {
    FfmpegTranscoder::new(config.transcoder.ffmpeg.clone(), config.transcoder.timeout())
}

/// Wire a pipeline from configuration.
pub fn build_pipeline(config: &Config) -> ForensicPipeline {
    let mut pipeline = ForensicPipeline::new(Box::new(build_transcoder(config)))
        .with_store(WaveformStore::new(config.output.sample_format))
        .with_masker(ForensicMasker::new(config.masking.clip_duration_secs))
        .with_url_prefix(&config.output.url_prefix);

    if config.separator.enabled {
        pipeline = pipeline.with_separator(Box::new(DemucsCommandSeparator::new(
            config.separator.command.clone(),
            &config.separator.model,
            config.separator.two_stems,
            config.separator.timeout(),
        )));
    }

    // Slack over the commands' own timeouts for the I/O around them.
    let slowest = config.separator.timeout().max(config.classifier.timeout());
    pipeline = pipeline.with_stage_timeout(slowest + Duration::from_secs(30));

    if let Some(classifier) = build_classifier(&config.classifier) {
        pipeline = pipeline.with_classifier(classifier);
    }

    pipeline
}

/// Run one separation job and return its envelope.
///
/// Argument and configuration problems come back as error envelopes too, so
/// the caller always has exactly one document to print.
pub async fn run_separate_command(config: &Config, args: JobArgs) -> JobResult {
    let mut log = DebugLog::new();

    if let Err(e) = config.validate() {
        log.push(format!("Configuration rejected: {}", e));
        return JobResult::from_error(&e, log);
    }

    let job_id = match JobId::parse(&args.job_id) {
        Ok(id) => id,
        Err(e) => return JobResult::from_error(&e, log),
    };

    let mut job = Job::new(job_id, args.input, args.output_dir);
    if let Some(path) = args.classification {
        job = job.with_classification(path);
    }

    tracing::info!(job = %job.job_id, input = %job.input_path.display(), "starting job");
    let result = build_pipeline(config).run(&job).await;
    tracing::info!(
        job = %job.job_id,
        success = result.is_success(),
        stems = result.stems().map_or(0, |s| s.len()),
        "job finished"
    );
    result
}

/// Classify one file and return the classification report.
pub async fn run_classify_command(config: &Config, input: &Path, job_id: &str) -> ClassificationReport {
    if !input.exists() {
        return ClassificationReport::error(format!("File not found: {}", input.display()));
    }

    let Some(classifier) = build_classifier(&config.classifier) else {
        return ClassificationReport::error("Classifier disabled (backend = none)");
    };

    let store = WaveformStore::new(config.output.sample_format);
    let transcoder = build_transcoder(config);
    let mut log = DebugLog::new();

    let loaded = match load_or_transcode(
        &store,
        &transcoder,
        input,
        TranscodeTarget::classifier(),
        &mut log,
    )
    .await
    {
        Ok(loaded) => loaded,
        Err(e) => return ClassificationReport::error(e.to_string()),
    };

    match detect_events(classifier.as_ref(), &loaded.waveform, &mut log).await {
        Ok(events) => ClassificationReport::success(job_id, events),
        Err(e) => ClassificationReport::error(e.to_string()),
    }
}
