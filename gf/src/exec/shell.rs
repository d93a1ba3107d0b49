//! Shell collaborator - runs one command and captures its output

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ExecConfig;

/// Captured result of one shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// Combined stdout and stderr
    pub output: String,
    /// Set when the command could not run or exited non-zero
    pub exit_error: Option<String>,
}

impl ShellOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_error: Some(error.into()),
        }
    }
}

/// Runs shell commands; invoked at most once per confirmed step
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str) -> ShellOutput;
}

/// Runs commands as `<shell> -c <command>`
#[derive(Debug, Clone)]
pub struct BashRunner {
    shell: String,
    timeout: Duration,
    max_output_chars: usize,
}

impl BashRunner {
    pub fn from_config(config: &ExecConfig) -> Self {
        debug!(?config, "BashRunner::from_config: called");
        Self {
            shell: config.shell.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_output_chars: config.max_output_chars,
        }
    }
}

impl Default for BashRunner {
    fn default() -> Self {
        Self::from_config(&ExecConfig::default())
    }
}

#[async_trait]
impl ShellRunner for BashRunner {
    async fn run(&self, command: &str) -> ShellOutput {
        debug!(%command, shell = %self.shell, "BashRunner::run: called");
        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                debug!(status = ?output.status, "BashRunner::run: command completed");
                output
            }
            Ok(Err(e)) => {
                debug!(%e, "BashRunner::run: failed to spawn");
                return ShellOutput::failure("", format!("Failed to execute command: {}", e));
            }
            Err(_) => {
                debug!("BashRunner::run: command timed out");
                return ShellOutput::failure(
                    "",
                    format!("Command timed out after {}ms", self.timeout.as_millis()),
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let combined = if stdout.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };
        let combined = truncate_output(combined, self.max_output_chars);

        if output.status.success() {
            ShellOutput::success(combined)
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            ShellOutput::failure(combined, format!("Exit code: {}", code))
        }
    }
}

fn truncate_output(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}...\n[truncated, {} chars total]",
            &text[..cut],
            text.chars().count()
        ),
        None => text,
    }
}
