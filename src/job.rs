//! One separation request and the pipeline that runs it.
//!
//! [`ForensicPipeline::run`] is the only place errors turn into results: every
//! stage below it returns `Result`, and whatever reaches the boundary becomes
//! an error [`JobResult`] carrying the transcript gathered so far.

use crate::audio::{TranscodeTarget, Transcodes, Waveform, WaveformStore, load_or_transcode};
use crate::classify::{Classifies, detect_events};
use crate::debug_log::DebugLog;
use crate::defaults;
use crate::error::{ForensicError, Result};
use crate::events::{SoundEvent, load_classification};
use crate::masker::ForensicMasker;
use crate::separate::{Separates, prepare_for_separator};
use crate::stems::{JobResult, OutputLayout, StemSet, assemble};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Job identifier, safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// # Errors
    /// Returns `InvalidJob` for an empty id, `.` or `..`, or an id containing
    /// a path separator or NUL.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: &str| ForensicError::InvalidJob {
            message: format!("job id {:?} {}", raw, message),
        };
        if raw.trim().is_empty() {
            return Err(invalid("is empty"));
        }
        if raw == "." || raw == ".." {
            return Err(invalid("is not a directory name"));
        }
        if raw.contains(['/', '\\', '\0']) {
            return Err(invalid("contains a path separator"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub classification_path: Option<PathBuf>,
}

impl Job {
    pub fn new(job_id: JobId, input_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            classification_path: None,
        }
    }

    pub fn with_classification(mut self, path: impl Into<PathBuf>) -> Self {
        self.classification_path = Some(path.into());
        self
    }
}

/// Decode, separate and classify concurrently, mask, assemble.
pub struct ForensicPipeline {
    store: WaveformStore,
    transcoder: Box<dyn Transcodes>,
    separator: Option<Box<dyn Separates>>,
    classifier: Option<Box<dyn Classifies>>,
    masker: ForensicMasker,
    url_prefix: String,
    stage_timeout: Option<Duration>,
}

impl ForensicPipeline {
    /// A pipeline with no separator and no classifier.
    pub fn new(transcoder: Box<dyn Transcodes>) -> Self {
        Self {
            store: WaveformStore::default(),
            transcoder,
            separator: None,
            classifier: None,
            masker: ForensicMasker::default(),
            url_prefix: defaults::URL_PREFIX.to_string(),
            stage_timeout: None,
        }
    }

    pub fn with_store(mut self, store: WaveformStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_separator(mut self, separator: Box<dyn Separates>) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Classifier used when a job carries no classification file.
    pub fn with_classifier(mut self, classifier: Box<dyn Classifies>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_masker(mut self, masker: ForensicMasker) -> Self {
        self.masker = masker;
        self
    }

    pub fn with_url_prefix(mut self, prefix: &str) -> Self {
        self.url_prefix = prefix.to_string();
        self
    }

    /// Upper bound on each of the separator and classifier stages.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Run one job to its terminal result. Never fails.
    pub async fn run(&self, job: &Job) -> JobResult {
        let mut log = DebugLog::new();
        match self.execute(job, &mut log).await {
            Ok((separated, generated)) => assemble(separated, generated, log),
            Err(e) => {
                tracing::error!(job = %job.job_id, error = %e, "job failed");
                JobResult::from_error(&e, log)
            }
        }
    }

    async fn execute(&self, job: &Job, log: &mut DebugLog) -> Result<(StemSet, StemSet)> {
        log.push(format!(
            "Start separation. Input: {}, Job: {}",
            job.input_path.display(),
            job.job_id
        ));

        if !job.input_path.exists() {
            return Err(ForensicError::UnreadableAudio {
                path: job.input_path.display().to_string(),
                message: "file not found".to_string(),
            });
        }

        // Holds the transcoded scratch file, if any, until the job ends.
        let loaded = load_or_transcode(
            &self.store,
            self.transcoder.as_ref(),
            &job.input_path,
            TranscodeTarget::separator(),
            log,
        )
        .await?;
        let waveform = &loaded.waveform;
        log.push(format!(
            "Loaded audio. Sample rate: {}, Shape: {:?}",
            waveform.sample_rate(),
            waveform.shape()
        ));

        let layout = OutputLayout::new(&job.output_dir, &self.url_prefix, job.job_id.as_str());

        let separation = async {
            let mut branch = DebugLog::new();
            let result = self.separate(waveform, &layout, &mut branch).await;
            (result, branch)
        };
        let classification = async {
            let mut branch = DebugLog::new();
            let result = self
                .sound_events(waveform, job.classification_path.as_deref(), &mut branch)
                .await;
            (result, branch)
        };
        let ((separated, separation_log), (events, classification_log)) =
            tokio::join!(separation, classification);
        log.append(separation_log);
        log.append(classification_log);

        let separated = separated?;

        let generated = match events {
            Ok(Some(events)) => match self.mask(waveform, &events, &separated, &layout, log) {
                Ok(generated) => generated,
                Err(e) => {
                    log.push(format!("Masking Exception: {}", e));
                    StemSet::new()
                }
            },
            Ok(None) => StemSet::new(),
            Err(e) => {
                log.push(format!("Masking Exception: {}", e));
                StemSet::new()
            }
        };

        Ok((separated, generated))
    }

    async fn separate(
        &self,
        waveform: &Waveform,
        layout: &OutputLayout,
        log: &mut DebugLog,
    ) -> Result<StemSet> {
        let Some(separator) = &self.separator else {
            log.push("Separator disabled, skipping source separation.");
            return Ok(StemSet::new());
        };

        let model = separator.model_name();
        let prepared = prepare_for_separator(waveform);
        log.push(format!(
            "Running separator {} at {} Hz, {} channels",
            model,
            prepared.sample_rate(),
            prepared.channel_count()
        ));

        let stems = match self.bounded("separator", separator.separate(&prepared)).await {
            Ok(stems) => stems,
            Err(e) => {
                log.push(format!("Separation error: {}", e));
                return Err(e);
            }
        };
        stems.persist(&self.store, layout, model, log)
    }

    /// Events to mask: from the job's file, else from the classifier, else none.
    async fn sound_events(
        &self,
        waveform: &Waveform,
        classification_path: Option<&Path>,
        log: &mut DebugLog,
    ) -> Result<Option<Vec<SoundEvent>>> {
        if let Some(path) = classification_path {
            if !path.exists() {
                log.push(format!(
                    "Classification file not found: {}, skipping masking.",
                    path.display()
                ));
                return Ok(None);
            }
            log.push("Starting forensic masking...");
            let report = load_classification(path, log)?;
            return Ok(Some(report.sound_events));
        }

        let Some(classifier) = &self.classifier else {
            return Ok(None);
        };
        log.push("Starting forensic masking...");
        let events = self
            .bounded("classifier", detect_events(classifier.as_ref(), waveform, log))
            .await?;
        Ok(Some(events))
    }

    fn mask(
        &self,
        waveform: &Waveform,
        events: &[SoundEvent],
        separated: &StemSet,
        layout: &OutputLayout,
        log: &mut DebugLog,
    ) -> Result<StemSet> {
        let outcome = self.masker.mask(waveform, events, separated, log)?;
        outcome.persist(&self.store, layout, log)
    }

    async fn bounded<T>(&self, stage: &str, future: impl Future<Output = Result<T>>) -> Result<T> {
        let Some(limit) = self.stage_timeout else {
            return future.await;
        };
        tokio::time::timeout(limit, future)
            .await
            .map_err(|_| ForensicError::Timeout {
                command: stage.to_string(),
                after: limit,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transcode::mock::MockTranscoder;
    use crate::classify::{Detection, MockClassifier};
    use crate::audio::PlanarAudio;
    use crate::separate::{MockSeparator, SeparatedStems};
    use async_trait::async_trait;

    fn tone(seconds: usize) -> Waveform {
        let samples = (0..8000 * seconds)
            .map(|i| ((i % 100) as f32 / 100.0) - 0.5)
            .collect();
        Waveform::mono(8000, samples).unwrap()
    }

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("input.wav");
        WaveformStore::default().write(&path, &tone(3)).unwrap();
        path
    }

    fn job(dir: &Path, input: PathBuf) -> Job {
        Job::new(JobId::parse("job-1").unwrap(), input, dir.join("out"))
    }

    struct SlowSeparator;

    #[async_trait]
    impl Separates for SlowSeparator {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn separate(&self, _audio: &PlanarAudio) -> Result<SeparatedStems> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(SeparatedStems::new())
        }
    }

    #[test]
    fn job_id_rejects_escapes() {
        assert!(JobId::parse("abc-123").is_ok());
        for bad in ["", "  ", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(
                matches!(JobId::parse(bad), Err(ForensicError::InvalidJob { .. })),
                "{:?} accepted",
                bad
            );
        }
        assert_eq!("j7".parse::<JobId>().unwrap().to_string(), "j7");
    }

    #[tokio::test]
    async fn missing_input_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::four_stem()));

        let result = pipeline.run(&job(dir.path(), dir.path().join("nope.wav"))).await;
        assert!(!result.is_success());
        assert!(result.message().unwrap().contains("file not found"));
        assert!(result.debug().contains("Start separation. Input:"));
    }

    #[tokio::test]
    async fn separator_stems_are_persisted_under_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::four_stem()));

        let result = pipeline.run(&job(dir.path(), input)).await;
        let stems = result.stems().unwrap();
        assert_eq!(
            stems.names().collect::<Vec<_>>(),
            ["background", "bass", "drums", "vocals"]
        );
        assert_eq!(
            stems.get("background"),
            Some("/separated_audio/htdemucs/job-1/other.wav")
        );
        assert!(dir.path().join("out/htdemucs/job-1/vocals.wav").exists());
    }

    #[tokio::test]
    async fn separator_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::four_stem().with_failure()))
            .with_classifier(Box::new(
                MockClassifier::new().with_detections(vec![Detection::new(0, "Siren", 0.9)]),
            ));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert!(!result.is_success());
        assert!(result.message().unwrap().contains("mock separator failure"));
        assert!(result.debug().contains("Separation error:"));
        assert!(!dir.path().join("out/generated").exists());
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_separator_stems() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::two_stem()))
            .with_classifier(Box::new(MockClassifier::new().with_failure()));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert!(result.is_success());
        assert_eq!(result.stems().unwrap().len(), 2);
        assert!(result.debug().contains("Masking Exception: Classifier failed"));
    }

    #[tokio::test]
    async fn classifier_events_are_masked_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing())).with_classifier(
            Box::new(MockClassifier::new().with_detections(vec![
                Detection::new(1, "Siren", 0.8),
                Detection::new(2, "Speech", 0.6),
            ])),
        );

        let result = pipeline.run(&job(dir.path(), input)).await;
        let stems = result.stems().unwrap();
        assert_eq!(stems.names().collect::<Vec<_>>(), ["sirens", "vocals"]);
        assert!(result.debug().contains("Separator disabled"));
        assert!(result.debug().contains("Found 2 sound events."));
    }

    #[tokio::test]
    async fn classification_file_takes_precedence_over_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let classification = dir.path().join("c.json");
        std::fs::write(
            &classification,
            r#"{"status":"success","soundEvents":[{"time":0.5,"type":"Gunshot / Explosion"}]}"#,
        )
        .unwrap();
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing())).with_classifier(
            Box::new(MockClassifier::new().with_detections(vec![Detection::new(0, "Dog", 0.8)])),
        );

        let result = pipeline
            .run(&job(dir.path(), input).with_classification(&classification))
            .await;
        let stems = result.stems().unwrap();
        assert_eq!(stems.names().collect::<Vec<_>>(), ["gunshots"]);
        assert!(!result.debug().contains("Running classifier"));
    }

    #[tokio::test]
    async fn malformed_classification_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let classification = dir.path().join("c.json");
        std::fs::write(&classification, "{broken").unwrap();
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::two_stem()));

        let result = pipeline
            .run(&job(dir.path(), input).with_classification(&classification))
            .await;
        assert!(result.is_success());
        assert!(result.debug().contains("Masking Exception: Malformed classification file"));
    }

    #[tokio::test]
    async fn undecodable_input_goes_through_transcoder_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mp3");
        std::fs::write(&input, b"ID3\x04 not a riff").unwrap();
        let transcoder = MockTranscoder::producing(tone(2));
        let pipeline = ForensicPipeline::new(Box::new(transcoder.clone()))
            .with_separator(Box::new(MockSeparator::two_stem()));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert!(result.is_success(), "{:?}", result);
        assert!(result.debug().contains("Direct read failed"));
        assert!(result.debug().contains("Converted to"));
        assert_eq!(transcoder.call_count(), 1);

        let scratch = transcoder.produced_paths();
        assert_eq!(scratch.len(), 1);
        assert!(!scratch[0].exists(), "{} left behind", scratch[0].display());
    }

    #[tokio::test]
    async fn transcoded_scratch_is_removed_when_separator_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.m4a");
        std::fs::write(&input, b"\0\0\0 ftyp not a riff").unwrap();
        let transcoder = MockTranscoder::producing(tone(2));
        let pipeline = ForensicPipeline::new(Box::new(transcoder.clone()))
            .with_separator(Box::new(MockSeparator::four_stem().with_failure()));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert!(!result.is_success());
        assert!(result.debug().contains("Separation error:"));

        let scratch = transcoder.produced_paths();
        assert_eq!(scratch.len(), 1);
        assert!(!scratch[0].exists(), "{} left behind", scratch[0].display());
    }

    #[tokio::test]
    async fn transcoder_failure_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mp3");
        std::fs::write(&input, b"garbage").unwrap();
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(MockSeparator::two_stem()));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert!(!result.is_success());
        assert!(result.message().unwrap().starts_with("Unreadable audio"));
        assert!(result.debug().contains("Conversion failed"));
    }

    #[tokio::test]
    async fn slow_separator_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let pipeline = ForensicPipeline::new(Box::new(MockTranscoder::failing()))
            .with_separator(Box::new(SlowSeparator))
            .with_stage_timeout(Duration::from_millis(50));

        let result = pipeline.run(&job(dir.path(), input)).await;
        assert_eq!(result.message(), Some("separator timed out after 50ms"));
        assert!(result.debug().contains("Separation error: separator timed out after 50ms"));
    }
}
