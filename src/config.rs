use crate::audio::OutputSampleFormat;
use crate::defaults;
use crate::error::{ForensicError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub transcoder: TranscoderConfig,
    pub separator: SeparatorConfig,
    pub classifier: ClassifierConfig,
    pub masking: MaskingConfig,
    pub output: OutputConfig,
}

/// Format-normalization fallback (ffmpeg)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscoderConfig {
    pub ffmpeg: PathBuf,
    pub timeout_secs: u64,
}

/// Source separation (demucs)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeparatorConfig {
    pub enabled: bool,
    pub command: PathBuf,
    pub model: String,
    /// Ask for vocals / no_vocals only.
    pub two_stems: bool,
    pub timeout_secs: u64,
}

/// Event classification used when a job has no classification file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    /// Executable for the `command` backend.
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

/// Which classifier runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Built-in spectral rules, no model needed.
    #[default]
    Heuristic,
    /// External model wrapper printing JSON detections.
    Command,
    /// No classification; only a job's classification file is masked.
    None,
}

impl FromStr for ClassifierBackend {
    type Err = ForensicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "command" => Ok(Self::Command),
            "none" => Ok(Self::None),
            other => Err(ForensicError::ConfigInvalidValue {
                key: "classifier.backend".to_string(),
                message: format!("unknown backend {:?}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaskingConfig {
    pub clip_duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Public prefix the output directory is served under.
    pub url_prefix: String,
    pub sample_format: OutputSampleFormat,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(defaults::FFMPEG_COMMAND),
            timeout_secs: defaults::TRANSCODE_TIMEOUT_SECS,
        }
    }
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: PathBuf::from(defaults::SEPARATOR_COMMAND),
            model: defaults::SEPARATOR_MODEL.to_string(),
            two_stems: false,
            timeout_secs: defaults::SEPARATOR_TIMEOUT_SECS,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            command: String::new(),
            args: Vec::new(),
            timeout_secs: defaults::CLASSIFIER_TIMEOUT_SECS,
        }
    }
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            clip_duration_secs: defaults::CLIP_DURATION_SECS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            url_prefix: defaults::URL_PREFIX.to_string(),
            sample_format: OutputSampleFormat::default(),
        }
    }
}

impl TranscoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SeparatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
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
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - FORENSIC_SONAR_FFMPEG → transcoder.ffmpeg
    /// - FORENSIC_SONAR_SEPARATOR → separator.command
    /// - FORENSIC_SONAR_CLASSIFIER → classifier.backend
    /// - FORENSIC_SONAR_CLASSIFIER_COMMAND → classifier.command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ffmpeg) = std::env::var("FORENSIC_SONAR_FFMPEG")
            && !ffmpeg.is_empty()
        {
            self.transcoder.ffmpeg = PathBuf::from(ffmpeg);
        }

        if let Ok(separator) = std::env::var("FORENSIC_SONAR_SEPARATOR")
            && !separator.is_empty()
        {
            self.separator.command = PathBuf::from(separator);
        }

        if let Ok(backend) = std::env::var("FORENSIC_SONAR_CLASSIFIER")
            && !backend.is_empty()
        {
            match backend.parse() {
                Ok(backend) => self.classifier.backend = backend,
                Err(e) => tracing::warn!("ignoring FORENSIC_SONAR_CLASSIFIER: {}", e),
            }
        }

        if let Ok(command) = std::env::var("FORENSIC_SONAR_CLASSIFIER_COMMAND")
            && !command.is_empty()
        {
            self.classifier.command = command;
        }

        self
    }

    /// Reject values no job could run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| {
            Err(ForensicError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        let clip = self.masking.clip_duration_secs;
        if !(clip.is_finite() && clip > 0.0) {
            return invalid("masking.clip_duration_secs", "must be a positive number");
        }
        if self.transcoder.timeout_secs == 0 {
            return invalid("transcoder.timeout_secs", "must be greater than zero");
        }
        if self.separator.timeout_secs == 0 {
            return invalid("separator.timeout_secs", "must be greater than zero");
        }
        let model = self.separator.model.as_str();
        if matches!(model.trim(), "" | "." | "..") || model.contains(['/', '\\', '\0']) {
            return invalid("separator.model", "must be a plain model name");
        }
        if self.classifier.timeout_secs == 0 {
            return invalid("classifier.timeout_secs", "must be greater than zero");
        }
        if self.classifier.backend == ClassifierBackend::Command
            && self.classifier.command.trim().is_empty()
        {
            return invalid("classifier.command", "required for the command backend");
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/forensic-sonar/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::APP_NAME).join("config.toml"))
    }
}
