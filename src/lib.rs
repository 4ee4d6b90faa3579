//! forensic-sonar - Forensic audio analysis
//!
//! Splits a recording into separator stems and event-masked forensic stems
//! (voice, vehicle, gunshot, ...) and reports them as one JSON envelope.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod debug_log;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod job;
pub mod masker;
pub mod process;
pub mod separate;
pub mod stems;

// Composition root - needs the CLI argument types
#[cfg(feature = "cli")]
pub mod app;

// Collaborator seams
pub use audio::Transcodes;
pub use classify::Classifies;
pub use separate::Separates;

// Core
pub use audio::{PlanarAudio, Waveform, WaveformStore};
pub use events::{ForensicCategory, SoundEvent, categorize};
pub use job::{ForensicPipeline, Job, JobId};
pub use masker::{ForensicMasker, MaskOutcome};
pub use stems::{JobResult, StemSet};

// Error handling
pub use error::{ForensicError, Result};

// Config
pub use config::{ClassifierBackend, Config};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
