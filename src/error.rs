//! Error types for forensic-sonar.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio I/O errors
    #[error("Unreadable audio at {path}: {message}")]
    UnreadableAudio { path: String, message: String },

    #[error("Invalid audio buffer: {message}")]
    InvalidAudio { message: String },

    #[error("Failed to write audio to {path}: {message}")]
    AudioWrite { path: String, message: String },

    // Collaborator errors
    #[error("Model not available ({model}): {message}")]
    MissingModel { model: String, message: String },

    #[error("External tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{stage} failed: {message}")]
    Inference { stage: String, message: String },

    #[error("{command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    // Classification input errors
    #[error("Malformed classification file {path}: {message}")]
    MalformedClassification { path: String, message: String },

    // Job errors
    #[error("Invalid job: {message}")]
    InvalidJob { message: String },

    #[error("Separation failed, no stems found.")]
    NoStemsProduced,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ForensicError>;
