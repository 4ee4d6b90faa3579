//! Per-job debug transcript.
//!
//! Every stage of a job appends human-readable lines here. The transcript is
//! part of the job result, so it is an owned value threaded through the stages
//! by `&mut` rather than a global logger. Each line is mirrored to `tracing`
//! at debug level for operators watching stderr.

use serde::Serialize;

/// Ordered, append-only list of diagnostic lines for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DebugLog {
    lines: Vec<String>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(target: "forensic_sonar::job", "{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Move every line of `other` onto the end of this log.
    ///
    /// Used to merge the transcripts of stages that ran concurrently. The
    /// lines were already mirrored to tracing when first pushed.
    pub fn append(&mut self, other: DebugLog) {
        self.lines.extend(other.lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_order() {
        let mut log = DebugLog::new();
        log.push("first");
        log.push(String::from("second"));
        log.push(format!("third {}", 3));

        assert_eq!(log.lines(), ["first", "second", "third 3"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn new_log_is_empty() {
        let log = DebugLog::new();
        assert!(log.is_empty());
        assert!(!log.contains("anything"));
    }

    #[test]
    fn contains_matches_substrings() {
        let mut log = DebugLog::new();
        log.push("Found 12 sound events.");
        assert!(log.contains("12 sound events"));
        assert!(!log.contains("13 sound events"));
    }

    #[test]
    fn append_keeps_both_orders() {
        let mut main = DebugLog::new();
        main.push("start");
        let mut branch = DebugLog::new();
        branch.push("branch 1");
        branch.push("branch 2");

        main.append(branch);
        assert_eq!(main.lines(), ["start", "branch 1", "branch 2"]);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut log = DebugLog::new();
        log.push("a");
        log.push("b");
        assert_eq!(serde_json::to_string(&log).unwrap(), r#"["a","b"]"#);
    }
}
