//! External command execution with a hard timeout.
//!
//! The transcoder and the command-backed separator/classifier all shell out.
//! They go through the `CommandRunner` trait so tests can substitute a mock
//! and never need the real tools installed.

use crate::error::{ForensicError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most `timeout`.
    ///
    /// Returns the captured output on a zero exit status.
    ///
    /// # Errors
    /// - `ToolNotFound` if the program does not exist
    /// - `Timeout` if it does not finish in time (the child is killed)
    /// - `Inference` on a non-zero exit status, with the tail of stderr
    async fn run(&self, program: &Path, args: &[OsString], timeout: Duration)
    -> Result<CommandOutput>;
}

/// Production runner using `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[OsString],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let name = program.display().to_string();
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ForensicError::ToolNotFound { tool: name.clone() }
                } else {
                    ForensicError::Inference {
                        stage: name.clone(),
                        message: format!("failed to start: {}", e),
                    }
                }
            })?;

        tracing::debug!(command = %name, ?args, "spawned");

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ForensicError::Timeout {
                    command: name,
                    after: timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ForensicError::Inference {
                stage: name,
                message: format!("exited with {}: {}", output.status, tail(&stderr, 400)),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Last `max` bytes of `text` (on a char boundary), trimmed.
pub fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
