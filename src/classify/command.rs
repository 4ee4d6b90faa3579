//! Classifier backed by an external model wrapper.
//!
//! The command is invoked as `<command> <args...> <input.wav>` on a scratch
//! 16 kHz mono WAV and must print a JSON array of detections to stdout:
//!
//! ```json
//! [{"frame": 0, "label": "Speech", "score": 0.91}, ...]
//! ```

use super::{Classifies, Detection};
use crate::audio::{Waveform, WaveformStore};
use crate::error::{ForensicError, Result};
use crate::process::{CommandRunner, SystemCommandRunner};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub struct CommandClassifier<R: CommandRunner = SystemCommandRunner> {
    command: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    runner: R,
}

impl CommandClassifier<SystemCommandRunner> {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self::with_runner(command, args, timeout, SystemCommandRunner::new())
    }
}

impl<R: CommandRunner> CommandClassifier<R> {
    pub fn with_runner(
        command: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        runner: R,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            runner,
        }
    }
}

/// Parse the wrapper's stdout.
pub fn parse_detections(stdout: &str) -> Result<Vec<Detection>> {
    serde_json::from_str(stdout.trim()).map_err(|e| ForensicError::Inference {
        stage: "Classifier".to_string(),
        message: format!("unexpected classifier output: {}", e),
    })
}

#[async_trait]
impl<R: CommandRunner> Classifies for CommandClassifier<R> {
    fn name(&self) -> &str {
        self.command
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("command")
    }

    async fn classify(&self, audio: &Waveform) -> Result<Vec<Detection>> {
        let input = tempfile::Builder::new()
            .prefix("forensic-sonar-classify-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path();
        WaveformStore::default().write(&input, audio)?;

        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(input.to_path_buf().into_os_string());

        let output = self
            .runner
            .run(&self.command, &args, self.timeout)
            .await
            .map_err(|e| match e {
                ForensicError::ToolNotFound { tool } => ForensicError::MissingModel {
                    model: tool,
                    message: "classifier command not found".to_string(),
                },
                other => other,
            })?;

        parse_detections(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockCommandRunner;

    fn audio() -> Waveform {
        Waveform::mono(16000, vec![0.1; 1600]).unwrap()
    }

    #[test]
    fn parses_detection_array() {
        let detections =
            parse_detections(r#" [{"frame":0,"label":"Speech","score":0.9},{"frame":1,"label":"Dog","score":0.4}] "#)
                .unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1], Detection::new(1, "Dog", 0.4));
    }

    #[test]
    fn rejects_non_array_output() {
        let result = parse_detections(r#"{"status":"error"}"#);
        assert!(matches!(result, Err(ForensicError::Inference { .. })));
    }

    #[tokio::test]
    async fn passes_args_then_scratch_wav() {
        let runner = MockCommandRunner::new().with_stdout(r#"[{"frame":2,"label":"Siren","score":0.7}]"#);
        let classifier = CommandClassifier::with_runner(
            "/opt/yamnet/classify",
            vec!["--top".to_string(), "1".to_string()],
            Duration::from_secs(5),
            runner,
        );

        let detections = classifier.classify(&audio()).await.unwrap();
        assert_eq!(detections, [Detection::new(2, "Siren", 0.7)]);
        assert_eq!(classifier.name(), "classify");

        let calls = classifier.runner.calls();
        assert_eq!(calls[0].0, "/opt/yamnet/classify");
        assert_eq!(&calls[0].1[..2], ["--top", "1"]);
        let scratch = PathBuf::from(&calls[0].1[2]);
        assert_eq!(scratch.extension().and_then(|e| e.to_str()), Some("wav"));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn missing_command_is_missing_model() {
        let runner = MockCommandRunner::new().with_response(Err(ForensicError::ToolNotFound {
            tool: "yamnet".to_string(),
        }));
        let classifier = CommandClassifier::with_runner("yamnet", Vec::new(), Duration::from_secs(1), runner);
        assert!(matches!(
            classifier.classify(&audio()).await,
            Err(ForensicError::MissingModel { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_propagates() {
        let runner = MockCommandRunner::new().with_response(Err(ForensicError::Timeout {
            command: "yamnet".to_string(),
            after: Duration::from_secs(1),
        }));
        let classifier = CommandClassifier::with_runner("yamnet", Vec::new(), Duration::from_secs(1), runner);
        assert!(matches!(
            classifier.classify(&audio()).await,
            Err(ForensicError::Timeout { .. })
        ));
    }
}
