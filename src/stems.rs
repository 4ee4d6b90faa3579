//! Stem maps, output layout and the terminal job result.

use crate::debug_log::DebugLog;
use crate::error::ForensicError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Stem name to public URL. Keys are unique and never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StemSet {
    stems: BTreeMap<String, String>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name` unless it is already present. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, url: impl Into<String>) -> bool {
        let name = name.into();
        if self.stems.contains_key(&name) {
            return false;
        }
        self.stems.insert(name, url.into());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stems.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.stems.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.stems.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add every entry of `other` whose key is not already present.
    pub fn union_absent(&mut self, other: StemSet) {
        for (name, url) in other.stems {
            self.stems.entry(name).or_insert(url);
        }
    }
}

/// Where one job's files go on disk and how they are addressed publicly.
///
/// ```text
/// <output_dir>/generated/<job_id>/<stem>.wav  ->  <prefix>/generated/<job_id>/<stem>.wav
/// <output_dir>/<model>/<job_id>/<stem>.wav    ->  <prefix>/<model>/<job_id>/<stem>.wav
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    output_dir: PathBuf,
    url_prefix: String,
    job_id: String,
}

impl OutputLayout {
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: &str, job_id: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            job_id: job_id.to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory for stems produced by masking.
    pub fn generated_dir(&self) -> PathBuf {
        self.output_dir
            .join(crate::defaults::GENERATED_DIR)
            .join(&self.job_id)
    }

    pub fn generated_url(&self, stem: &str) -> String {
        format!(
            "{}/{}/{}/{}.wav",
            self.url_prefix,
            crate::defaults::GENERATED_DIR,
            self.job_id,
            stem
        )
    }

    /// Directory for stems produced by the separator model `model`.
    pub fn separated_dir(&self, model: &str) -> PathBuf {
        self.output_dir.join(model).join(&self.job_id)
    }

    pub fn separated_url(&self, model: &str, stem: &str) -> String {
        format!("{}/{}/{}/{}.wav", self.url_prefix, model, self.job_id, stem)
    }
}

/// Terminal outcome of one job, serialized as the JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobResult {
    Success { stems: StemSet, debug: DebugLog },
    Error { message: String, debug: DebugLog },
}

impl JobResult {
    pub fn error(message: impl Into<String>, debug: DebugLog) -> Self {
        JobResult::Error {
            message: message.into(),
            debug,
        }
    }

    pub fn from_error(error: &ForensicError, debug: DebugLog) -> Self {
        Self::error(error.to_string(), debug)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn stems(&self) -> Option<&StemSet> {
        match self {
            JobResult::Success { stems, .. } => Some(stems),
            JobResult::Error { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::Error { message, .. } => Some(message),
        }
    }

    pub fn debug(&self) -> &DebugLog {
        match self {
            JobResult::Success { debug, .. } | JobResult::Error { debug, .. } => debug,
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and maps of strings: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"status\":\"error\",\"message\":{:?},\"debug\":[]}}",
                e.to_string()
            )
        })
    }
}

/// Union separator stems with masked stems and decide the outcome.
///
/// Separator entries win on a key collision. An empty union is the
/// "no stems" error.
pub fn assemble(separated: StemSet, generated: StemSet, mut debug: DebugLog) -> JobResult {
    let mut stems = separated;
    stems.union_absent(generated);

    if stems.is_empty() {
        debug.push("No stems were generated.");
        return JobResult::from_error(&ForensicError::NoStemsProduced, debug);
    }

    JobResult::Success { stems, debug }
}
