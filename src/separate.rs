//! Source separation collaborator.
//!
//! A separator takes stereo audio at the model rate and returns named stems.
//! The production implementation shells out to the demucs CLI; tests use
//! [`MockSeparator`].

use crate::audio::{PlanarAudio, Waveform, WaveformStore};
use crate::debug_log::DebugLog;
use crate::defaults;
use crate::error::{ForensicError, Result};
use crate::process::{CommandRunner, SystemCommandRunner};
use crate::stems::{OutputLayout, StemSet};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for source separation.
///
/// Implementations receive audio already prepared by [`prepare_for_separator`].
#[async_trait]
pub trait Separates: Send + Sync {
    /// Model name; also the output sub-directory for persisted stems.
    fn model_name(&self) -> &str;

    /// Split `audio` into named stems.
    async fn separate(&self, audio: &PlanarAudio) -> Result<SeparatedStems>;
}

/// Stereo at the model rate, channel-major.
pub fn prepare_for_separator(waveform: &Waveform) -> PlanarAudio {
    waveform
        .to_stereo()
        .resample(defaults::SEPARATOR_SAMPLE_RATE)
        .to_planar()
}

/// Public stem key for a raw separator stem name.
///
/// `other` (4-stem) and `no_vocals` (2-stem) are exposed as `background`.
pub fn stem_key(raw: &str) -> &str {
    match raw {
        "other" | "no_vocals" => "background",
        name => name,
    }
}

/// Named stems returned by a separator, in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeparatedStems {
    stems: Vec<(String, PlanarAudio)>,
}

impl SeparatedStems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, audio: PlanarAudio) {
        self.stems.push((name.into(), audio));
    }

    pub fn get(&self, name: &str) -> Option<&PlanarAudio> {
        self.stems.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Write every stem to `<output>/<model>/<job>/<name>.wav` and map it to
    /// its public key.
    ///
    /// # Errors
    /// Returns `AudioWrite` if a stem cannot be written.
    pub fn persist(
        self,
        store: &WaveformStore,
        layout: &OutputLayout,
        model: &str,
        log: &mut DebugLog,
    ) -> Result<StemSet> {
        let mut stems = StemSet::new();
        if self.stems.is_empty() {
            return Ok(stems);
        }

        let dir = layout.separated_dir(model);
        for (name, audio) in self.stems {
            let path = dir.join(format!("{}.wav", name));
            store.write(&path, &audio.into_waveform())?;
            let key = stem_key(&name);
            if !stems.insert_if_absent(key, layout.separated_url(model, &name)) {
                tracing::warn!(stem = %name, key, "duplicate separator stem key ignored");
            }
        }
        log.push(format!("Separator output saved to: {}", dir.display()));
        Ok(stems)
    }
}

/// Separator backed by the demucs command-line tool.
#[derive(Debug)]
pub struct DemucsCommandSeparator<R: CommandRunner = SystemCommandRunner> {
    command: PathBuf,
    model: String,
    two_stems: bool,
    timeout: Duration,
    runner: R,
}

impl DemucsCommandSeparator<SystemCommandRunner> {
    pub fn new(command: impl Into<PathBuf>, model: &str, two_stems: bool, timeout: Duration) -> Self {
        Self::with_runner(command, model, two_stems, timeout, SystemCommandRunner::new())
    }
}

impl<R: CommandRunner> DemucsCommandSeparator<R> {
    pub fn with_runner(
        command: impl Into<PathBuf>,
        model: &str,
        two_stems: bool,
        timeout: Duration,
        runner: R,
    ) -> Self {
        Self {
            command: command.into(),
            model: model.to_string(),
            two_stems,
            timeout,
            runner,
        }
    }

    fn args(&self, input: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-n".into(), self.model.clone().into()];
        if self.two_stems {
            args.push("--two-stems".into());
            args.push("vocals".into());
        }
        args.push("-o".into());
        args.push(out_dir.into());
        args.push(input.into());
        args
    }

    /// Load every `*.wav` demucs left in `dir`, sorted by name.
    fn collect_stems(dir: &Path) -> Result<SeparatedStems> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| ForensicError::Inference {
                stage: "Separator".to_string(),
                message: format!("no output directory {}: {}", dir.display(), e),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
            .collect();
        paths.sort();

        let store = WaveformStore::default();
        let mut stems = SeparatedStems::new();
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let waveform = store.load(&path)?;
            stems.push(name, waveform.to_planar());
        }
        Ok(stems)
    }
}

#[async_trait]
impl<R: CommandRunner> Separates for DemucsCommandSeparator<R> {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn separate(&self, audio: &PlanarAudio) -> Result<SeparatedStems> {
        let scratch = tempfile::Builder::new()
            .prefix("forensic-sonar-separate-")
            .tempdir()?;
        let input = scratch.path().join("input.wav");
        let out_dir = scratch.path().join("out");

        WaveformStore::default().write(&input, &audio.clone().into_waveform())?;

        tracing::info!(model = %self.model, "running separator");
        self.runner
            .run(&self.command, &self.args(&input, &out_dir), self.timeout)
            .await
            .map_err(|e| match e {
                ForensicError::ToolNotFound { tool } => ForensicError::MissingModel {
                    model: self.model.clone(),
                    message: format!("separator command not found: {}", tool),
                },
                other => other,
            })?;

        // demucs writes <out>/<model>/<input stem>/<stem>.wav
        let stems = Self::collect_stems(&out_dir.join(&self.model).join("input"))?;
        if stems.is_empty() {
            return Err(ForensicError::Inference {
                stage: "Separator".to_string(),
                message: format!("{} produced no stems", self.command.display()),
            });
        }
        Ok(stems)
    }
}

/// Mock separator for testing.
///
/// Every configured stem is a copy of the input scaled by `gain`.
#[derive(Debug)]
pub struct MockSeparator {
    model: String,
    stem_names: Vec<String>,
    gain: f32,
    should_fail: bool,
    last_input: Mutex<Option<PlanarAudio>>,
}

impl MockSeparator {
    /// A separator producing no stems at all.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            stem_names: Vec::new(),
            gain: 0.5,
            should_fail: false,
            last_input: Mutex::new(None),
        }
    }

    /// htdemucs-style 4-stem output.
    pub fn four_stem() -> Self {
        Self::new(defaults::SEPARATOR_MODEL).with_stems(&["drums", "bass", "other", "vocals"])
    }

    /// 2-stem vocals / no_vocals output.
    pub fn two_stem() -> Self {
        Self::new(defaults::SEPARATOR_MODEL).with_stems(&["vocals", "no_vocals"])
    }

    pub fn with_stems(mut self, names: &[&str]) -> Self {
        self.stem_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// The audio most recently handed to `separate`.
    pub fn last_input(&self) -> Option<PlanarAudio> {
        self.last_input.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl Separates for MockSeparator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn separate(&self, audio: &PlanarAudio) -> Result<SeparatedStems> {
        if let Ok(mut last) = self.last_input.lock() {
            *last = Some(audio.clone());
        }
        if self.should_fail {
            return Err(ForensicError::MissingModel {
                model: self.model.clone(),
                message: "mock separator failure".to_string(),
            });
        }

        let mut stems = SeparatedStems::new();
        for name in &self.stem_names {
            let channels = (0..audio.channel_count())
                .map(|c| {
                    audio
                        .channel(c)
                        .unwrap_or_default()
                        .iter()
                        .map(|s| s * self.gain)
                        .collect()
                })
                .collect();
            stems.push(name.clone(), PlanarAudio::new(audio.sample_rate(), channels)?);
        }
        Ok(stems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::process::mock::MockCommandRunner;

    fn mono_16k() -> Waveform {
        Waveform::mono(16000, vec![0.5; 1600]).unwrap()
    }

    #[test]
    fn prepare_duplicates_mono_and_resamples() {
        let planar = prepare_for_separator(&mono_16k());
        assert_eq!(planar.channel_count(), 2);
        assert_eq!(planar.sample_rate(), 44100);
        assert!((4410..=4411).contains(&planar.len()), "len {}", planar.len());
        assert_eq!(planar.channel(0), planar.channel(1));
    }

    #[test]
    fn prepare_keeps_stereo_at_model_rate() {
        let w = Waveform::new(44100, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let planar = prepare_for_separator(&w);
        assert_eq!(planar.channel(0), Some(&[0.1, 0.3][..]));
        assert_eq!(planar.channel(1), Some(&[0.2, 0.4][..]));
    }

    #[test]
    fn stem_keys() {
        assert_eq!(stem_key("vocals"), "vocals");
        assert_eq!(stem_key("other"), "background");
        assert_eq!(stem_key("no_vocals"), "background");
        assert_eq!(stem_key("drums"), "drums");
        assert_eq!(stem_key("bass"), "bass");
    }

    #[tokio::test]
    async fn mock_separator_records_input() {
        let separator = MockSeparator::four_stem();
        let input = prepare_for_separator(&mono_16k());
        let stems = separator.separate(&input).await.unwrap();

        assert_eq!(
            stems.names().collect::<Vec<_>>(),
            ["drums", "bass", "other", "vocals"]
        );
        assert_eq!(separator.last_input(), Some(input));
        assert_eq!(stems.get("vocals").unwrap().channel(0).unwrap()[0], 0.25);
    }

    #[tokio::test]
    async fn mock_separator_failure() {
        let separator = MockSeparator::four_stem().with_failure();
        let input = prepare_for_separator(&mono_16k());
        assert!(matches!(
            separator.separate(&input).await,
            Err(ForensicError::MissingModel { .. })
        ));
    }

    #[tokio::test]
    async fn persist_maps_other_to_background() {
        let dir = tempfile::tempdir().unwrap();
        let stems = MockSeparator::four_stem()
            .separate(&prepare_for_separator(&mono_16k()))
            .await
            .unwrap();
        let layout = OutputLayout::new(dir.path(), "/separated_audio", "job-9");
        let mut log = DebugLog::new();

        let set = stems
            .persist(&WaveformStore::default(), &layout, "htdemucs", &mut log)
            .unwrap();

        assert_eq!(
            set.get("background"),
            Some("/separated_audio/htdemucs/job-9/other.wav")
        );
        assert_eq!(
            set.get("vocals"),
            Some("/separated_audio/htdemucs/job-9/vocals.wav")
        );
        assert!(set.contains("drums"));
        assert!(set.contains("bass"));
        assert!(dir.path().join("htdemucs/job-9/other.wav").exists());
        assert!(log.contains("Separator output saved to:"));
    }

    #[test]
    fn demucs_args_four_stem() {
        let separator = DemucsCommandSeparator::with_runner(
            "demucs",
            "htdemucs",
            false,
            Duration::from_secs(1),
            MockCommandRunner::new(),
        );
        let args: Vec<String> = separator
            .args(Path::new("/s/input.wav"), Path::new("/s/out"))
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, ["-n", "htdemucs", "-o", "/s/out", "/s/input.wav"]);
    }

    #[test]
    fn demucs_args_two_stem() {
        let separator = DemucsCommandSeparator::with_runner(
            "demucs",
            "mdx_extra",
            true,
            Duration::from_secs(1),
            MockCommandRunner::new(),
        );
        let args: Vec<String> = separator
            .args(Path::new("in.wav"), Path::new("out"))
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            ["-n", "mdx_extra", "--two-stems", "vocals", "-o", "out", "in.wav"]
        );
    }

    #[tokio::test]
    async fn demucs_missing_binary_is_missing_model() {
        let runner = MockCommandRunner::new().with_response(Err(ForensicError::ToolNotFound {
            tool: "demucs".to_string(),
        }));
        let separator = DemucsCommandSeparator::with_runner(
            "demucs",
            "htdemucs",
            false,
            Duration::from_secs(1),
            runner,
        );
        let result = separator
            .separate(&prepare_for_separator(&mono_16k()))
            .await;
        match result {
            Err(ForensicError::MissingModel { model, message }) => {
                assert_eq!(model, "htdemucs");
                assert!(message.contains("demucs"));
            }
            other => panic!("Expected MissingModel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn demucs_without_output_is_an_error() {
        let runner = MockCommandRunner::new().with_response(Ok(CommandOutput::default()));
        let separator = DemucsCommandSeparator::with_runner(
            "demucs",
            "htdemucs",
            false,
            Duration::from_secs(1),
            runner,
        );
        let result = separator
            .separate(&prepare_for_separator(&mono_16k()))
            .await;
        assert!(matches!(result, Err(ForensicError::Inference { .. })));
    }

    #[test]
    fn collect_stems_reads_sorted_wavs() {
        let dir = tempfile::tempdir().unwrap();
        let store = WaveformStore::default();
        let w = Waveform::new(44100, 2, vec![0.1, 0.2]).unwrap();
        store.write(&dir.path().join("vocals.wav"), &w).unwrap();
        store.write(&dir.path().join("no_vocals.wav"), &w).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let stems = DemucsCommandSeparator::<MockCommandRunner>::collect_stems(dir.path()).unwrap();
        assert_eq!(stems.names().collect::<Vec<_>>(), ["no_vocals", "vocals"]);
    }
}
