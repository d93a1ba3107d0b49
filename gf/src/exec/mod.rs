//! Execution gateway - turns an approved step into its mode's side effect
//!
//! In execute mode the step's command goes to the shell collaborator; in
//! write-to-file mode the command text is appended to a sink, one per line.
//! Side effects are never rolled back, and a failure only affects its own step.

mod shell;
mod sink;

pub use shell::{BashRunner, ShellOutput, ShellRunner};
pub use sink::FileSink;

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plan::Step;

/// What to do with approved commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Run commands immediately
    #[default]
    Execute,
    /// Record commands to the sink instead of running them
    WriteToFile,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Execute => "execute",
            Mode::WriteToFile => "write-to-file",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "execute" | "1" => Ok(Mode::Execute),
            "write-to-file" | "write" | "2" => Ok(Mode::WriteToFile),
            other => Err(format!("invalid mode '{}' (expected execute or write-to-file)", other)),
        }
    }
}

/// Per-step dispatch failures
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("step {0} has no command")]
    NoCommand(u32),

    #[error("{message}")]
    CommandFailed { message: String, output: String },

    #[error("failed to write command: {0}")]
    Sink(#[from] std::io::Error),
}

/// Successful dispatch result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Command ran; captured output
    Executed { output: String },
    /// Command text appended to the sink
    Written { command: String },
}

/// Confirmation-gated dispatcher
#[derive(Clone)]
pub struct Gateway {
    runner: Arc<dyn ShellRunner>,
}

impl Gateway {
    pub fn new(runner: Arc<dyn ShellRunner>) -> Self {
        Self { runner }
    }

    /// Dispatch one approved step
    ///
    /// Callers must not dispatch informational steps; doing so returns
    /// `ExecutionError::NoCommand` without touching the shell or the sink.
    pub async fn dispatch(
        &self,
        mode: Mode,
        step: &Step,
        sink: &mut (dyn Write + Send),
    ) -> Result<Dispatched, ExecutionError> {
        debug!(%mode, step = step.number, "Gateway::dispatch: called");
        let command = step.runnable_command().ok_or(ExecutionError::NoCommand(step.number))?;

        match mode {
            Mode::Execute => {
                info!(step = step.number, %command, "Executing step");
                let result = self.runner.run(command).await;
                match result.exit_error {
                    None => Ok(Dispatched::Executed { output: result.output }),
                    Some(message) => {
                        warn!(step = step.number, %message, "Step command failed");
                        Err(ExecutionError::CommandFailed {
                            message,
                            output: result.output,
                        })
                    }
                }
            }
            Mode::WriteToFile => {
                info!(step = step.number, %command, "Recording step");
                writeln!(sink, "{}", command)
                    .and_then(|_| sink.flush())
                    .map_err(|e| {
                        warn!(step = step.number, error = %e, "Failed to record step");
                        ExecutionError::Sink(e)
                    })?;
                Ok(Dispatched::Written {
                    command: command.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
pub mod spy {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Shell runner that records commands instead of running them
    #[derive(Default)]
    pub struct SpyRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl SpyRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report a non-zero exit for this exact command
        pub fn failing_on(command: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(command.to_string()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ShellRunner for SpyRunner {
        async fn run(&self, command: &str) -> ShellOutput {
            self.calls.lock().unwrap().push(command.to_string());
            if self.fail_on.as_deref() == Some(command) {
                ShellOutput::failure("boom", "Exit code: 1")
            } else {
                ShellOutput::success(format!("ran {}", command))
            }
        }
    }
}
