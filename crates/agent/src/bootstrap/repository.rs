// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository provisioning: host clone plus optional volume mirror.
//!
//! The host clone is permanent — the build CLI reads devcontainer
//! configuration from the host path — while the volume copy is what the
//! running container actually mounts. Cloning is crash-safe: the clone
//! lands in a staging directory and is renamed into place only once the
//! remote has been rewritten to the token-free URL, so a VM interrupted
//! mid-clone never leaves a partial tree behind the `.git` check.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_adapters::git::{GitCli, GitError};
use berth_core::{AgentConfig, RepoUrl};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Make the configured repository available on the host (and mirrored into
/// the volume when one is in use). No-ops when no repository is configured.
pub async fn ensure_repository_ready(
    cancel: &CancellationToken,
    config: &AgentConfig,
    git: &GitCli,
    containers: &ContainerCli,
    github_token: Option<&str>,
    prime_permissions: bool,
) -> Result<(), RepositoryError> {
    let Some(url) = RepoUrl::parse(&config.repo) else {
        tracing::info!("no repository configured, skipping clone");
        return Ok(());
    };

    if config.workspace_dir.join(".git").exists() {
        tracing::debug!(path = %config.workspace_dir.display(), "host clone already present");
    } else {
        clone_fresh(cancel, config, git, &url, github_token).await?;
    }

    if config.use_volume {
        mirror_into_volume(cancel, config, containers, prime_permissions).await?;
    }
    Ok(())
}

/// Clone into a staging directory, strip the token from the remote, then
/// rename into place.
async fn clone_fresh(
    cancel: &CancellationToken,
    config: &AgentConfig,
    git: &GitCli,
    url: &RepoUrl,
    github_token: Option<&str>,
) -> Result<(), RepositoryError> {
    let dest = &config.workspace_dir;
    let staging = staging_path(dest);

    for path in [dest, &staging] {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|source| RepositoryError::Io { path: path.clone(), source })?;
        }
    }
    // git clones happily into an existing empty directory.
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|source| RepositoryError::Io { path: staging.clone(), source })?;

    let clone_url = match github_token {
        Some(token) => url.with_token(token),
        None => url.as_str().to_string(),
    };
    tracing::info!(repo = %url, branch = %config.branch, "cloning repository");
    git.clone_branch(cancel, &clone_url, &config.branch, &staging).await?;

    // Rewrite the remote before the rename so no token ever exists under
    // the final path.
    git.set_remote_url(cancel, &staging, url.as_str()).await?;

    tokio::fs::rename(&staging, dest)
        .await
        .map_err(|source| RepositoryError::Io { path: dest.clone(), source })?;
    Ok(())
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Copy the host clone into the volume via a disposable helper container.
///
/// The eventual container user is unknown at this stage, so permission
/// priming opens the tree up (`a+rwX`); ownership is reconciled precisely
/// once the container user is resolved.
async fn mirror_into_volume(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
    prime_permissions: bool,
) -> Result<(), RepositoryError> {
    let volume = config.volume_name();

    let probe = containers
        .run_disposable(
            cancel,
            &config.helper_image,
            &[(volume.clone(), "/workspace".to_string())],
            "test -d /workspace/.git && echo present || echo absent",
            None,
        )
        .await?;
    if probe.trimmed().ends_with("present") {
        tracing::debug!(volume = %volume, "volume already seeded");
        return Ok(());
    }

    let mut script = "cp -a /src/. /workspace/".to_string();
    if prime_permissions {
        script.push_str(" && chmod -R a+rwX /workspace");
    }
    tracing::info!(volume = %volume, "seeding volume from host clone");
    containers
        .run_disposable(
            cancel,
            &config.helper_image,
            &[
                (config.workspace_dir.display().to_string(), "/src".to_string()),
                (volume, "/workspace".to_string()),
            ],
            &script,
            None,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
