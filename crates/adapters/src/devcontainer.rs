// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Devcontainer build CLI driver.
//!
//! The build CLI is installed asynchronously on fresh VMs (npm global
//! install raced against boot), so callers wait for it to appear on PATH
//! before the first build. `up` failures carry their combined output — it
//! becomes the build-error marker.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_core::devconfig::{DevconfigError, DevcontainerConfig};

use crate::subprocess::{CommandRunner, CommandSpec, SubprocessError};

/// Ceiling for a single `up` invocation (image pulls + feature installs).
const UP_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Progress log cadence while waiting for the CLI to appear.
const WAIT_LOG_EVERY: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DevcontainerError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    /// `up` ran and failed; `output` is the diagnostics payload.
    #[error("devcontainer up failed: {output}")]
    UpFailed { output: String },

    #[error("devcontainer read-configuration failed: {output}")]
    ReadConfiguration { output: String },

    #[error("devcontainer read-configuration returned no configuration document")]
    NoConfiguration,

    #[error(transparent)]
    Devconfig(#[from] DevconfigError),

    #[error("wait for devcontainer CLI cancelled")]
    WaitCancelled,
}

/// Driver for the devcontainer build CLI.
#[derive(Clone)]
pub struct DevcontainerCli {
    runner: Arc<dyn CommandRunner>,
    program: String,
    poll_interval: Duration,
}

impl DevcontainerCli {
    pub fn new(runner: Arc<dyn CommandRunner>, poll_interval: Duration) -> Self {
        Self { runner, program: "devcontainer".to_string(), poll_interval }
    }

    pub fn with_program(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self { runner, program: program.into(), poll_interval }
    }

    /// Block until the build CLI is on PATH, logging progress roughly every
    /// 30 seconds. Never gives up on its own; cancellation is the only exit.
    pub async fn wait_until_available(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), DevcontainerError> {
        let mut waited = Duration::ZERO;
        let mut last_logged = Duration::ZERO;
        loop {
            if on_path(&self.program) {
                if waited > Duration::ZERO {
                    tracing::info!(cli = %self.program, waited_secs = waited.as_secs(), "build CLI is available");
                }
                return Ok(());
            }
            if waited - last_logged >= WAIT_LOG_EVERY {
                tracing::info!(cli = %self.program, waited_secs = waited.as_secs(), "waiting for build CLI to appear on PATH");
                last_logged = waited;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(DevcontainerError::WaitCancelled),
                _ = tokio::time::sleep(self.poll_interval) => waited += self.poll_interval,
            }
        }
    }

    /// Build and start the environment for `workspace_folder`.
    ///
    /// `id_label` (key=value) is stamped onto the container so discovery by
    /// label finds exactly this workspace. `override_config` replaces the
    /// repository's configuration when the workspace is volume-backed or
    /// when falling back to the default image.
    pub async fn up(
        &self,
        cancel: &CancellationToken,
        workspace_folder: &Path,
        id_label: &str,
        override_config: Option<&Path>,
    ) -> Result<(), DevcontainerError> {
        let mut args = vec![
            "up".to_string(),
            "--workspace-folder".to_string(),
            workspace_folder.display().to_string(),
            "--id-label".to_string(),
            id_label.to_string(),
        ];
        if let Some(config) = override_config {
            args.push("--override-config".to_string());
            args.push(config.display().to_string());
        }
        let spec = CommandSpec::new(&self.program, args).with_timeout(UP_TIMEOUT);
        let output = self.runner.run(cancel, spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(DevcontainerError::UpFailed { output: output.combined })
        }
    }

    /// Read the resolved configuration for `workspace_folder`, preferring the
    /// merged document (config + features + image metadata).
    pub async fn read_configuration(
        &self,
        cancel: &CancellationToken,
        workspace_folder: &Path,
    ) -> Result<DevcontainerConfig, DevcontainerError> {
        let spec = CommandSpec::new(
            &self.program,
            [
                "read-configuration",
                "--workspace-folder",
                &workspace_folder.display().to_string(),
                "--include-merged-configuration",
            ],
        );
        let output = self.runner.run(cancel, spec).await?;
        if !output.success() {
            return Err(DevcontainerError::ReadConfiguration { output: output.combined });
        }

        // The CLI logs onto stdout too; the result document is the last line
        // that parses as a JSON object.
        let document = output
            .combined
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .ok_or(DevcontainerError::NoConfiguration)?;

        let config = document
            .get("mergedConfiguration")
            .or_else(|| document.get("configuration"))
            .cloned()
            .unwrap_or(document);
        Ok(DevcontainerConfig::from_value(config)?)
    }
}

/// Whether `program` resolves to an executable file on PATH.
fn on_path(program: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| {
        let candidate = dir.join(program);
        is_executable(&candidate)
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "devcontainer_tests.rs"]
mod tests;
