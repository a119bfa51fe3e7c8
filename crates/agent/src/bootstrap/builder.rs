// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Devcontainer build with fallback to the default image.
//!
//! The repository's own configuration is always tried first; a failure
//! there is recoverable, not fatal. Before any fallback container starts,
//! the primary failure's output is persisted to the host (and mirrored into
//! the volume) — a workspace must never end up running a fallback
//! environment with no trace of why the real one failed, so a diagnostics
//! write failure aborts the fallback instead.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_adapters::devcontainer::{DevcontainerCli, DevcontainerError};
use berth_core::config::BUILD_ERROR_MARKER;
use berth_core::{AgentConfig, DevcontainerConfig};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Devcontainer(#[from] DevcontainerError),

    #[error("failed to create workspace directory {path}: {source}")]
    WorkspaceDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist build diagnostics to {path}, aborting fallback: {source}")]
    DiagnosticsPersist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to mirror build diagnostics into the volume, aborting fallback: {0}")]
    DiagnosticsMirror(#[source] ContainerError),

    #[error("failed to write configuration {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fallback build from the default image failed: {output}")]
    FallbackFailed { output: String },

    #[error(
        "build failed with the repository configuration and the fallback also failed: \
         {fallback}; original failure: {primary}"
    )]
    BothAttemptsFailed { primary: String, fallback: String },
}

/// What the build produced.
#[derive(Debug)]
pub struct BuildOutcome {
    /// ID of the running workspace container.
    pub container: String,
    /// Whether this attempt used the default image instead of the
    /// repository's configuration.
    pub fallback: bool,
    /// The container was discovered already running; no build ran.
    pub already_running: bool,
    /// The merged configuration used for a volume-backed repo build.
    pub merged_config: Option<DevcontainerConfig>,
}

/// Why the repository-configuration attempt failed.
enum PrimaryFailure {
    Build(DevcontainerError),
    NoRuntimeSource,
    OverrideWrite(PathBuf, io::Error),
}

impl PrimaryFailure {
    fn into_diagnostics(self) -> String {
        match self {
            PrimaryFailure::Build(DevcontainerError::UpFailed { output }) => output,
            PrimaryFailure::Build(DevcontainerError::ReadConfiguration { output }) => {
                format!("reading the devcontainer configuration failed:\n{output}")
            }
            PrimaryFailure::Build(error) => error.to_string(),
            PrimaryFailure::NoRuntimeSource => {
                "resolved devcontainer configuration has no image, dockerfile, or compose file"
                    .to_string()
            }
            PrimaryFailure::OverrideWrite(path, error) => {
                format!("failed to write override configuration {}: {error}", path.display())
            }
        }
    }
}

fn is_cancellation(error: &DevcontainerError) -> bool {
    match error {
        DevcontainerError::WaitCancelled => true,
        DevcontainerError::Subprocess(source) => source.is_cancelled(),
        _ => false,
    }
}

/// Whether the repository carries its own devcontainer configuration.
fn has_repo_config(workspace_dir: &Path) -> bool {
    workspace_dir.join(".devcontainer/devcontainer.json").exists()
        || workspace_dir.join(".devcontainer.json").exists()
}

pub struct DevcontainerBuilder<'a> {
    config: &'a AgentConfig,
    containers: &'a ContainerCli,
    devcontainers: &'a DevcontainerCli,
}

impl<'a> DevcontainerBuilder<'a> {
    pub fn new(
        config: &'a AgentConfig,
        containers: &'a ContainerCli,
        devcontainers: &'a DevcontainerCli,
    ) -> Self {
        Self { config, containers, devcontainers }
    }

    /// Bring up the workspace container, falling back to the default image
    /// when the repository's own configuration cannot build.
    pub async fn ensure_environment(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildError> {
        let label = self.config.container_label();

        if let Some(container) = self.containers.find_by_label(cancel, &label).await? {
            tracing::info!(%container, "workspace container already running");
            return Ok(BuildOutcome {
                container,
                fallback: false,
                already_running: true,
                merged_config: None,
            });
        }

        tokio::fs::create_dir_all(&self.config.workspace_dir).await.map_err(|source| {
            BuildError::WorkspaceDir { path: self.config.workspace_dir.clone(), source }
        })?;
        self.devcontainers.wait_until_available(cancel).await?;

        let mut primary_diagnostics = None;
        if has_repo_config(&self.config.workspace_dir) {
            match self.try_repo_config(cancel).await {
                Ok(merged_config) => {
                    self.clear_marker(cancel).await;
                    let container = self.containers.resolve_by_label(cancel, &label).await?;
                    return Ok(BuildOutcome {
                        container,
                        fallback: false,
                        already_running: false,
                        merged_config,
                    });
                }
                Err(PrimaryFailure::Build(error)) if is_cancellation(&error) => {
                    return Err(error.into());
                }
                Err(failure) => {
                    let diagnostics = failure.into_diagnostics();
                    tracing::warn!(
                        error = %diagnostics,
                        "repository devcontainer build failed, falling back to default image"
                    );
                    primary_diagnostics = Some(diagnostics);
                }
            }
        } else {
            tracing::info!("repository has no devcontainer configuration, using default image");
        }

        self.run_fallback(cancel, primary_diagnostics.as_deref()).await?;
        let container = self.containers.resolve_by_label(cancel, &label).await?;
        Ok(BuildOutcome { container, fallback: true, already_running: false, merged_config: None })
    }

    /// Attempt a build from the repository's own configuration.
    ///
    /// Volume-backed workspaces can't use the configuration as-is: the
    /// default bind mount must be replaced via the config's own
    /// mount/folder keys, and the read-back document must be rewritten
    /// into the shape `up` accepts.
    async fn try_repo_config(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<DevcontainerConfig>, PrimaryFailure> {
        let label = self.config.container_label();

        if !self.config.use_volume {
            self.devcontainers
                .up(cancel, &self.config.workspace_dir, &label, None)
                .await
                .map_err(PrimaryFailure::Build)?;
            return Ok(None);
        }

        let mut merged = self
            .devcontainers
            .read_configuration(cancel, &self.config.workspace_dir)
            .await
            .map_err(PrimaryFailure::Build)?;
        let volume = self.config.volume_name();
        merged.set_workspace_volume(&volume, &self.config.container_workspace_folder);
        if !merged.has_runtime_source() {
            return Err(PrimaryFailure::NoRuntimeSource);
        }
        merged.normalize_lifecycle_hooks();

        let override_path = self
            .write_config(&merged, "devcontainer-override.json")
            .await
            .map_err(|(path, source)| PrimaryFailure::OverrideWrite(path, source))?;
        self.devcontainers
            .up(cancel, &self.config.workspace_dir, &label, Some(&override_path))
            .await
            .map_err(PrimaryFailure::Build)?;
        Ok(Some(merged))
    }

    /// Build from the default image. `primary` holds the first attempt's
    /// output when there was one; it must be durable before the fallback
    /// container starts.
    async fn run_fallback(
        &self,
        cancel: &CancellationToken,
        primary: Option<&str>,
    ) -> Result<(), BuildError> {
        if let Some(output) = primary {
            self.persist_diagnostics(cancel, output).await?;
        }

        // The failed first attempt may have left a broken container behind;
        // the build CLI would happily reuse it.
        self.containers.remove_by_label(cancel, &self.config.container_label()).await?;

        let default_config = self.default_config();
        let config_path = self
            .write_config(&default_config, "devcontainer-default.json")
            .await
            .map_err(|(path, source)| BuildError::ConfigWrite { path, source })?;

        tracing::info!(image = %self.config.default_image, "building fallback environment");
        match self
            .devcontainers
            .up(cancel, &self.config.workspace_dir, &self.config.container_label(), Some(&config_path))
            .await
        {
            Ok(()) => Ok(()),
            Err(DevcontainerError::UpFailed { output }) => match primary {
                Some(primary) => Err(BuildError::BothAttemptsFailed {
                    primary: primary.to_string(),
                    fallback: output,
                }),
                None => Err(BuildError::FallbackFailed { output }),
            },
            Err(error) => Err(error.into()),
        }
    }

    /// Write the failure output to the host marker and, when a volume is in
    /// use, mirror it into the volume root. Any failure here aborts the
    /// fallback.
    async fn persist_diagnostics(
        &self,
        cancel: &CancellationToken,
        output: &str,
    ) -> Result<(), BuildError> {
        let path = self.config.marker_path();
        tokio::fs::write(&path, output)
            .await
            .map_err(|source| BuildError::DiagnosticsPersist { path: path.clone(), source })?;

        if self.config.use_volume {
            self.containers
                .run_disposable(
                    cancel,
                    &self.config.helper_image,
                    &[(self.config.volume_name(), "/workspace".to_string())],
                    &format!("cat > /workspace/{BUILD_ERROR_MARKER}"),
                    Some(output),
                )
                .await
                .map_err(BuildError::DiagnosticsMirror)?;
        }
        tracing::info!(marker = %path.display(), "persisted build diagnostics");
        Ok(())
    }

    /// Remove the marker after a successful repository-configuration build.
    /// Best-effort: a leftover marker only over-reports recovery.
    async fn clear_marker(&self, cancel: &CancellationToken) {
        let path = self.config.marker_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!(marker = %path.display(), "cleared build-error marker"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(marker = %path.display(), %error, "failed to clear build-error marker");
            }
        }

        if self.config.use_volume {
            let result = self
                .containers
                .run_disposable(
                    cancel,
                    &self.config.helper_image,
                    &[(self.config.volume_name(), "/workspace".to_string())],
                    &format!("rm -f /workspace/{BUILD_ERROR_MARKER}"),
                    None,
                )
                .await;
            if let Err(error) = result {
                tracing::warn!(%error, "failed to clear build-error marker in volume");
            }
        }
    }

    /// The fallback configuration: default image plus baseline tooling
    /// (version control and the hosting-platform CLI). The remote user is
    /// declared only when the operator configured one; otherwise the
    /// image's own default user applies.
    fn default_config(&self) -> DevcontainerConfig {
        let mut features = serde_json::Map::new();
        features.insert("ghcr.io/devcontainers/features/git:1".to_string(), serde_json::json!({}));
        features.insert(
            "ghcr.io/devcontainers/features/github-cli:1".to_string(),
            serde_json::json!({}),
        );
        for feature in &self.config.extra_features {
            features.insert(feature.clone(), serde_json::json!({}));
        }

        let mut doc = DevcontainerConfig::default();
        doc.insert("image", serde_json::Value::String(self.config.default_image.clone()));
        doc.insert("features", serde_json::Value::Object(features));
        if self.config.use_volume {
            doc.set_workspace_volume(
                &self.config.volume_name(),
                &self.config.container_workspace_folder,
            );
        }
        if let Some(user) = &self.config.remote_user {
            doc.insert("remoteUser", serde_json::Value::String(user.clone()));
        }
        doc
    }

    /// Write a configuration document next to the state file.
    async fn write_config(
        &self,
        doc: &DevcontainerConfig,
        name: &str,
    ) -> Result<PathBuf, (PathBuf, io::Error)> {
        let dir = self
            .config
            .state_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.workspace_dir.clone());
        if let Err(source) = tokio::fs::create_dir_all(&dir).await {
            return Err((dir, source));
        }
        let path = dir.join(name);
        match tokio::fs::write(&path, doc.to_json_pretty()).await {
            Ok(()) => Ok(path),
            Err(source) => Err((path, source)),
        }
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
