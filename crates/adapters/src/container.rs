// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container engine CLI driver.
//!
//! Thin, typed wrappers over the engine's verbs: volumes, label-filtered
//! lookup, disposable helper containers, exec, and file copy. All state
//! lives in the engine; these calls are safe to repeat.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::subprocess::{ensure_success, CommandOutput, CommandRunner, CommandSpec, SubprocessError};

/// Ceiling for helper-container runs (volume seeding copies a full clone).
const HELPER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    /// More than one container carries this workspace's label.
    #[error("{count} containers match label {label}, expected one")]
    AmbiguousLabel { label: String, count: usize },

    /// No container carries this workspace's label.
    #[error("no container matches label {label}")]
    NotFound { label: String },
}

/// Driver for the container engine CLI (`docker` unless overridden).
#[derive(Clone)]
pub struct ContainerCli {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl ContainerCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, program: "docker".to_string() }
    }

    pub fn with_program(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self { runner, program: program.into() }
    }

    async fn run_checked(
        &self,
        cancel: &CancellationToken,
        spec: CommandSpec,
    ) -> Result<CommandOutput, SubprocessError> {
        let output = self.runner.run(cancel, spec.clone()).await?;
        ensure_success(&spec, output)
    }

    /// Create a named volume. The engine's create is idempotent, so this is
    /// safe to repeat across reboots.
    pub async fn volume_create(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(), ContainerError> {
        let spec = CommandSpec::new(&self.program, ["volume", "create", name]);
        self.run_checked(cancel, spec).await?;
        Ok(())
    }

    /// Force-remove a named volume. Absent volumes are not an error.
    pub async fn volume_remove(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(), ContainerError> {
        let spec = CommandSpec::new(&self.program, ["volume", "rm", "-f", name]);
        let output = self.runner.run(cancel, spec).await?;
        if !output.success() && !output.combined.contains("no such volume") {
            tracing::warn!(volume = name, output = %output.trimmed(), "volume rm reported failure");
        }
        Ok(())
    }

    /// IDs of all containers (running or not) carrying `label`.
    async fn ids_by_label(
        &self,
        cancel: &CancellationToken,
        label: &str,
        all: bool,
    ) -> Result<Vec<String>, ContainerError> {
        let mut args = vec!["ps".to_string(), "-q".to_string()];
        if all {
            args.push("-a".to_string());
        }
        args.push("--filter".to_string());
        args.push(format!("label={label}"));
        let spec = CommandSpec::new(&self.program, args);
        let output = self.run_checked(cancel, spec).await?;
        Ok(output.combined.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// The single running container carrying `label`, if any. Multiple
    /// matches mean the workspace is in an inconsistent state.
    pub async fn find_by_label(
        &self,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<Option<String>, ContainerError> {
        let mut ids = self.ids_by_label(cancel, label, false).await?;
        match ids.len() {
            0 => Ok(None),
            1 => Ok(ids.pop()),
            count => Err(ContainerError::AmbiguousLabel { label: label.to_string(), count }),
        }
    }

    /// Like [`find_by_label`], but absence is an error.
    pub async fn resolve_by_label(
        &self,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<String, ContainerError> {
        self.find_by_label(cancel, label)
            .await?
            .ok_or_else(|| ContainerError::NotFound { label: label.to_string() })
    }

    /// Force-remove every container carrying `label`, running or stopped.
    pub async fn remove_by_label(
        &self,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<(), ContainerError> {
        let ids = self.ids_by_label(cancel, label, true).await?;
        for id in ids {
            let spec = CommandSpec::new(&self.program, ["rm", "-f", id.as_str()]);
            self.run_checked(cancel, spec).await?;
        }
        Ok(())
    }

    /// Run a disposable helper container: `run --rm` with the given mounts,
    /// executing `script` under `sh -c`.
    pub async fn run_disposable(
        &self,
        cancel: &CancellationToken,
        image: &str,
        mounts: &[(String, String)],
        script: &str,
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ContainerError> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        for (source, target) in mounts {
            args.push("-v".to_string());
            args.push(format!("{source}:{target}"));
        }
        args.push(image.to_string());
        args.extend(["sh".to_string(), "-c".to_string(), script.to_string()]);

        let mut spec = CommandSpec::new(&self.program, args).with_timeout(HELPER_TIMEOUT);
        if let Some(payload) = stdin {
            spec = spec.with_stdin(payload);
        }
        Ok(self.run_checked(cancel, spec).await?)
    }

    /// Execute a command inside a running container.
    pub async fn exec(
        &self,
        cancel: &CancellationToken,
        container: &str,
        user: Option<&str>,
        command: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ContainerError> {
        let mut args = vec!["exec".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        if let Some(user) = user {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        args.push(container.to_string());
        args.extend(command.iter().map(|s| s.to_string()));

        let mut spec = CommandSpec::new(&self.program, args);
        if let Some(payload) = stdin {
            spec = spec.with_stdin(payload);
        }
        Ok(self.run_checked(cancel, spec).await?)
    }

    /// Execute a shell script inside a running container.
    pub async fn exec_sh(
        &self,
        cancel: &CancellationToken,
        container: &str,
        user: Option<&str>,
        script: &str,
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ContainerError> {
        self.exec(cancel, container, user, &["sh", "-c", script], stdin).await
    }

    /// Copy a host file into a running container.
    pub async fn copy_into(
        &self,
        cancel: &CancellationToken,
        host_path: &Path,
        container: &str,
        container_path: &str,
    ) -> Result<(), ContainerError> {
        let spec = CommandSpec::new(
            &self.program,
            ["cp", &host_path.display().to_string(), &format!("{container}:{container_path}")],
        );
        self.run_checked(cancel, spec).await?;
        Ok(())
    }

    /// Read one label value off a container. Missing labels come back as
    /// `None` (the engine prints an empty line).
    pub async fn inspect_label(
        &self,
        cancel: &CancellationToken,
        container: &str,
        label_key: &str,
    ) -> Result<Option<String>, ContainerError> {
        let format = format!("{{{{ index .Config.Labels {label_key:?} }}}}");
        let spec = CommandSpec::new(&self.program, ["inspect", "--format", &format, container]);
        let output = self.run_checked(cancel, spec).await?;
        let value = output.trimmed();
        if value.is_empty() || value == "<no value>" {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
