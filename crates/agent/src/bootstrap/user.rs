// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container user detection and workspace ownership reconciliation.
//!
//! Which user owns the workspace files inside the container is resolved
//! through a cascade of sources; every tier is allowed to fail individually
//! (logged, fall through). Ownership is then reconciled idempotently — the
//! recursive chown is skipped when the mount point already has the right
//! owner, which is the common case on every boot after the first.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_adapters::devcontainer::DevcontainerCli;
use berth_core::{AgentConfig, DevcontainerConfig};

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("could not parse {what} for user {user}: {value:?}")]
    BadId { what: &'static str, user: String, value: String },
}

/// Resolve the user that should own the workspace inside `container`.
///
/// Cascade, first non-empty answer wins:
/// 1. operator-configured override (always wins outright),
/// 2. the build CLI's resolved merged configuration,
/// 3. the container's devcontainer-metadata label (last matching entry),
/// 4. `id -un` inside the running container.
///
/// `None` means every tier came up empty; the container's default execution
/// user applies and that is not an error.
pub async fn resolve_container_user(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
    devcontainers: &DevcontainerCli,
    container: &str,
    merged_config: Option<&DevcontainerConfig>,
) -> Option<String> {
    if let Some(user) = config.remote_user.as_deref().filter(|u| !u.is_empty()) {
        tracing::debug!(user, "container user from operator override");
        return Some(user.to_string());
    }

    if let Some(user) = user_from_merged_config(cancel, config, devcontainers, merged_config).await
    {
        tracing::debug!(user = %user, "container user from resolved configuration");
        return accept(user);
    }

    if let Some(user) = user_from_metadata_label(cancel, containers, container).await {
        tracing::debug!(user = %user, "container user from devcontainer metadata label");
        return accept(user);
    }

    if let Some(user) = user_from_id_command(cancel, containers, container).await {
        tracing::debug!(user = %user, "container user from `id -un`");
        return accept(user);
    }

    tracing::warn!("could not determine container user; using the container's default user");
    None
}

fn accept(user: String) -> Option<String> {
    if user == "root" {
        tracing::warn!("detected container user is root; workspace files will be root-owned");
    }
    Some(user)
}

/// Tier 2: the remote/container user from the merged configuration, reading
/// it back from the build CLI when the caller doesn't already hold one.
async fn user_from_merged_config(
    cancel: &CancellationToken,
    config: &AgentConfig,
    devcontainers: &DevcontainerCli,
    merged_config: Option<&DevcontainerConfig>,
) -> Option<String> {
    if let Some(merged) = merged_config {
        return merged.remote_user().map(String::from);
    }
    match devcontainers.read_configuration(cancel, &config.workspace_dir).await {
        Ok(merged) => merged.remote_user().map(String::from),
        Err(error) => {
            tracing::debug!(%error, "read-configuration unavailable for user detection");
            None
        }
    }
}

/// Tier 3: the `devcontainer.metadata` label holds an ordered JSON array of
/// metadata entries; the last one naming a user wins.
async fn user_from_metadata_label(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
) -> Option<String> {
    let raw = match containers.inspect_label(cancel, container, "devcontainer.metadata").await {
        Ok(value) => value?,
        Err(error) => {
            tracing::debug!(%error, "could not inspect devcontainer metadata label");
            return None;
        }
    };
    let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(serde_json::Value::Array(entries)) => entries,
        Ok(single @ serde_json::Value::Object(_)) => vec![single],
        _ => return None,
    };
    entries.iter().rev().find_map(|entry| {
        entry
            .get("remoteUser")
            .or_else(|| entry.get("containerUser"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Tier 4: whatever user `exec` lands in by default.
async fn user_from_id_command(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
) -> Option<String> {
    match containers.exec(cancel, container, None, &["id", "-un"], None).await {
        Ok(output) => {
            let user = output.trimmed().to_string();
            if user.is_empty() {
                None
            } else {
                Some(user)
            }
        }
        Err(error) => {
            tracing::debug!(%error, "id -un failed inside container");
            None
        }
    }
}

/// Make `folder` inside `container` owned by `user`.
///
/// Resolves uid/gid as root (the default user may lack permission to
/// inspect itself), compares with the current owner of the mount point, and
/// only chowns on mismatch. No-op for an empty or root user.
pub async fn reconcile_ownership(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
    user: Option<&str>,
    folder: &str,
) -> Result<(), OwnershipError> {
    let Some(user) = user.filter(|u| !u.is_empty() && *u != "root") else {
        tracing::debug!("no non-root container user resolved; skipping ownership reconciliation");
        return Ok(());
    };

    let uid = numeric_id(cancel, containers, container, user, "-u", "uid").await?;
    let gid = numeric_id(cancel, containers, container, user, "-g", "gid").await?;
    let wanted = format!("{uid}:{gid}");

    let current = containers
        .exec(cancel, container, Some("root"), &["stat", "-c", "%u:%g", folder], None)
        .await?
        .trimmed()
        .to_string();

    if current == wanted {
        tracing::debug!(folder, owner = %wanted, "workspace ownership already correct");
        return Ok(());
    }

    tracing::info!(folder, from = %current, to = %wanted, "reconciling workspace ownership");
    containers
        .exec(cancel, container, Some("root"), &["chown", "-R", &wanted, folder], None)
        .await?;
    Ok(())
}

async fn numeric_id(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
    user: &str,
    flag: &str,
    what: &'static str,
) -> Result<u32, OwnershipError> {
    let output =
        containers.exec(cancel, container, Some("root"), &["id", flag, user], None).await?;
    let value = output.trimmed().to_string();
    value.parse().map_err(|_| OwnershipError::BadId { what, user: user.to_string(), value })
}

#[cfg(test)]
#[path = "user_tests.rs"]
mod tests;
