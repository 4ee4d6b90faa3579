//! Format normalization through an external transcoder.
//!
//! hound only parses WAV. When a container fails to parse (MP3, M4A, a WAV
//! with an ID3 prefix, ...) the input is transcoded once to a scratch WAV and
//! read again. The scratch file is a `TempPath`, deleted when dropped, so it
//! disappears on every exit path of the job that created it.

use crate::audio::wav::WaveformStore;
use crate::audio::waveform::Waveform;
use crate::debug_log::DebugLog;
use crate::defaults;
use crate::error::{ForensicError, Result};
use crate::process::{CommandRunner, SystemCommandRunner};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;

/// Output parameters requested from the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeTarget {
    pub sample_rate: u32,
    /// `None` keeps the source channel layout.
    pub channels: Option<u16>,
}

impl TranscodeTarget {
    /// Input for the separator path: model rate, source channels.
    pub const fn separator() -> Self {
        Self {
            sample_rate: defaults::SEPARATOR_SAMPLE_RATE,
            channels: None,
        }
    }

    /// Input for the classifier path: 16 kHz mono.
    pub const fn classifier() -> Self {
        Self {
            sample_rate: defaults::CLASSIFIER_SAMPLE_RATE,
            channels: Some(1),
        }
    }
}

/// Converts an arbitrary media file into a WAV file.
#[async_trait]
pub trait Transcodes: Send + Sync {
    /// Transcode `input` and return the path of the scratch WAV.
    ///
    /// # Errors
    /// Returns `UnreadableAudio` if conversion fails for any reason.
    async fn transcode(&self, input: &Path, target: TranscodeTarget) -> Result<TempPath>;
}

/// Transcoder backed by an ffmpeg binary given at construction time.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder<R: CommandRunner = SystemCommandRunner> {
    binary: PathBuf,
    timeout: Duration,
    runner: R,
}

impl FfmpegTranscoder<SystemCommandRunner> {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::with_runner(binary, timeout, SystemCommandRunner::new())
    }
}

impl<R: CommandRunner> FfmpegTranscoder<R> {
    pub fn with_runner(binary: impl Into<PathBuf>, timeout: Duration, runner: R) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            runner,
        }
    }

    fn args(input: &Path, output: &Path, target: TranscodeTarget) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            input.into(),
            "-ar".into(),
            target.sample_rate.to_string().into(),
        ];
        if let Some(channels) = target.channels {
            args.push("-ac".into());
            args.push(channels.to_string().into());
        }
        args.push(output.into());
        args
    }
}

#[async_trait]
impl<R: CommandRunner> Transcodes for FfmpegTranscoder<R> {
    async fn transcode(&self, input: &Path, target: TranscodeTarget) -> Result<TempPath> {
        let unreadable = |message: String| ForensicError::UnreadableAudio {
            path: input.display().to_string(),
            message,
        };

        let output = tempfile::Builder::new()
            .prefix("forensic-sonar-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| unreadable(format!("cannot create scratch file: {}", e)))?
            .into_temp_path();

        let args = Self::args(input, &output, target);
        self.runner
            .run(&self.binary, &args, self.timeout)
            .await
            .map_err(|e| unreadable(format!("transcoding failed: {}", e)))?;

        Ok(output)
    }
}

/// A decoded input plus the scratch file it came from, if any.
///
/// Dropping this deletes the scratch file.
#[derive(Debug)]
pub struct LoadedAudio {
    pub waveform: Waveform,
    transcoded: Option<TempPath>,
}

impl LoadedAudio {
    pub fn transcoded_path(&self) -> Option<&Path> {
        self.transcoded.as_deref()
    }
}

/// Load `path`, falling back to exactly one transcode-and-retry.
///
/// # Errors
/// Returns `UnreadableAudio` if the direct read fails and either the
/// transcoder or the second read fails.
pub async fn load_or_transcode(
    store: &WaveformStore,
    transcoder: &dyn Transcodes,
    path: &Path,
    target: TranscodeTarget,
    log: &mut DebugLog,
) -> Result<LoadedAudio> {
    match store.load(path) {
        Ok(waveform) => Ok(LoadedAudio {
            waveform,
            transcoded: None,
        }),
        Err(ForensicError::UnreadableAudio { message, .. }) => {
            log.push(format!(
                "Direct read failed ({}), attempting conversion for {}",
                message,
                path.display()
            ));
            let scratch = match transcoder.transcode(path, target).await {
                Ok(scratch) => scratch,
                Err(e) => {
                    log.push(format!("Conversion failed: {}", e));
                    return Err(e);
                }
            };
            log.push(format!("Converted to {}", scratch.display()));
            let waveform = store.load(&scratch)?;
            Ok(LoadedAudio {
                waveform,
                transcoded: Some(scratch),
            })
        }
        Err(e) => Err(e),
    }
}
