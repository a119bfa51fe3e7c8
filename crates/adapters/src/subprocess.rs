// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution for external CLIs.
//!
//! Every external tool the agent drives (container engine, version control,
//! devcontainer build CLI) goes through the same abstraction: a command spec
//! in, combined output plus exit status out, bound to a cancellation token
//! supplied by the caller. Components never spawn processes directly.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Default ceiling for external commands that don't set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// One external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn with_stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Combined output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Stdout followed by stderr.
    pub combined: String,
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn ok(combined: impl Into<String>) -> Self {
        Self { combined: combined.into(), code: Some(0) }
    }

    pub fn failed(code: i32, combined: impl Into<String>) -> Self {
        Self { combined: combined.into(), code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn trimmed(&self) -> &str {
        self.combined.trim()
    }
}

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {output}")]
    Failed { command: String, code: Option<i32>, output: String },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}` cancelled")]
    Cancelled { command: String },

    #[error("i/o error driving `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SubprocessError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubprocessError::Cancelled { .. })
    }
}

/// Seam for running external commands.
///
/// `run` resolves `Ok` for any command that ran to completion, including a
/// failure exit — callers that require success use [`ensure_success`], and
/// callers that need the failure output (build diagnostics) read it from the
/// returned [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        spec: CommandSpec,
    ) -> Result<CommandOutput, SubprocessError>;
}

/// Map a failure exit to an error carrying the combined output.
pub fn ensure_success(
    spec: &CommandSpec,
    output: CommandOutput,
) -> Result<CommandOutput, SubprocessError> {
    if output.success() {
        Ok(output)
    } else {
        Err(SubprocessError::Failed {
            command: spec.display(),
            code: output.code,
            output: output.combined,
        })
    }
}

/// Runs commands as real child processes.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        spec: CommandSpec,
    ) -> Result<CommandOutput, SubprocessError> {
        let command_line = spec.display();
        tracing::debug!(command = %command_line, "running external command");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|source| SubprocessError::Spawn { command: command_line.clone(), source })?;

        if let Some(payload) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // A failed write means the child exited without reading;
                // its exit status carries the real story.
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!(command = %command_line, error = %e, "stdin write failed");
                }
            }
        }

        let timeout = spec.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let waited = tokio::select! {
            _ = cancel.cancelled() => {
                // Dropping the child kills it (kill_on_drop).
                return Err(SubprocessError::Cancelled { command: command_line });
            }
            waited = tokio::time::timeout(timeout, child.wait_with_output()) => waited,
        };

        let output = match waited {
            Err(_) => return Err(SubprocessError::TimedOut { command: command_line, timeout }),
            Ok(result) => {
                result.map_err(|source| SubprocessError::Io { command: command_line.clone(), source })?
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput { combined, code: output.status.code() })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::ScriptedRunner;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Response {
        Output(CommandOutput),
        NotFound,
    }

    struct Rule {
        prefix: String,
        /// Consumed front-to-back; the last response repeats.
        responses: VecDeque<Response>,
    }

    /// Scripted [`CommandRunner`] for tests.
    ///
    /// Rules match on a prefix of the rendered command line
    /// (`"docker volume create"` matches `docker volume create berth-ws-x`).
    /// First matching rule wins; unmatched commands succeed with empty
    /// output. Every invocation is recorded for assertions.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond to commands starting with `prefix`. Calling this again
        /// with the same prefix queues a follow-up response.
        pub fn on(&self, prefix: &str, output: CommandOutput) {
            self.push(prefix, Response::Output(output));
        }

        /// Fail commands starting with `prefix` as if the binary is absent.
        pub fn on_missing(&self, prefix: &str) {
            self.push(prefix, Response::NotFound);
        }

        fn push(&self, prefix: &str, response: Response) {
            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(rule) = rules.iter_mut().find(|r| r.prefix == prefix) {
                rule.responses.push_back(response);
            } else {
                rules.push(Rule {
                    prefix: prefix.to_string(),
                    responses: VecDeque::from([response]),
                });
            }
        }

        /// Rendered command lines of every invocation so far.
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(CommandSpec::display)
                .collect()
        }

        pub fn calls_matching(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }

        /// Stdin payload of the first invocation matching `prefix`.
        pub fn stdin_for(&self, prefix: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|c| c.display().starts_with(prefix))
                .and_then(|c| c.stdin.clone())
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            _cancel: &CancellationToken,
            spec: CommandSpec,
        ) -> Result<CommandOutput, SubprocessError> {
            let display = spec.display();
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(spec.clone());

            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            let Some(rule) = rules.iter_mut().find(|r| display.starts_with(&r.prefix)) else {
                return Ok(CommandOutput::ok(""));
            };
            let response = if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().map(|r| match r {
                    Response::Output(o) => Response::Output(o.clone()),
                    Response::NotFound => Response::NotFound,
                })
            };
            match response {
                Some(Response::Output(output)) => Ok(output),
                Some(Response::NotFound) => Err(SubprocessError::Spawn {
                    command: display,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
                None => Ok(CommandOutput::ok("")),
            }
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
