//! Classification documents: the event list the masker consumes.
//!
//! Documents come either from the built-in front-end (`classify` module) or
//! from a file handed to the job. Files are parsed leniently: missing fields
//! take defaults and `time` may be a number or a numeric string.

use crate::debug_log::DebugLog;
use crate::error::{ForensicError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// One detected acoustic event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundEvent {
    /// Onset in seconds from the start of the recording.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub time: f64,
    /// Raw or display label.
    #[serde(rename = "type", default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decibels: Option<f64>,
}

impl SoundEvent {
    pub fn new(time: f64, label: impl Into<String>) -> Self {
        Self {
            time,
            label: label.into(),
            confidence: None,
            decibels: None,
        }
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid event time {:?}", s))),
    }
}

/// Text field that also takes numbers and booleans; anything else is `None`.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Count that also takes a numeric string; anything else is `None`.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A classification document.
///
/// Only `soundEvents` is validated strictly; the descriptive fields never
/// reject a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationReport {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        rename = "jobID",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub detected_sounds: Option<usize>,
    #[serde(default)]
    pub sound_events: Vec<SoundEvent>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClassificationReport {
    pub fn success(job_id: impl Into<String>, events: Vec<SoundEvent>) -> Self {
        Self {
            status: Some("success".to_string()),
            job_id: Some(job_id.into()),
            detected_sounds: Some(events.len()),
            sound_events: events,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

/// Read a classification file, recording what was found in `log`.
///
/// A document with `status: "error"` is returned as-is after its message is
/// logged; the caller masks whatever events it carries.
///
/// # Errors
/// Returns `MalformedClassification` if the file cannot be read, is not JSON,
/// is not an object, or its events do not have the expected shape.
pub fn load_classification(path: &Path, log: &mut DebugLog) -> Result<ClassificationReport> {
    let malformed = |message: String| ForensicError::MalformedClassification {
        path: path.display().to_string(),
        message,
    };

    let text = std::fs::read_to_string(path).map_err(|e| malformed(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Err(malformed("expected a JSON object".to_string()));
    };
    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    log.push(format!("Loaded classification data. Keys: [{}]", keys.join(", ")));

    let report: ClassificationReport =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    if report.is_error() {
        log.push(format!(
            "Classification ERROR: {}",
            report.message.as_deref().unwrap_or("No message")
        ));
    }

    Ok(report)
}
