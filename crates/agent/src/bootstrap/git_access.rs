// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-container git access: credential helper installation and identity.
//!
//! The helper script implements the git credential-helper protocol and
//! fetches short-lived tokens from the agent's own HTTP endpoint on the
//! host. Per the credential-helper contract it always exits 0 — offering no
//! credential is a valid answer, never an error that would break `git`.

use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_core::config::CREDENTIAL_HELPER_PATH;
use berth_core::{AgentConfig, RepoUrl};

#[derive(Debug, Error)]
pub enum GitAccessError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Without a callback token the endpoint could never serve credentials;
    /// installing the helper would wedge every git fetch in the container.
    #[error("no callback token available for the git credential helper")]
    MissingCallbackToken,

    #[error("failed to stage credential helper script at {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const HELPER_TEMPLATE: &str = r#"#!/bin/sh
# git credential helper for berth workspaces.
# Fetches short-lived tokens from the workspace agent on the host.
# Always exits 0: offering no credential is a valid outcome.

[ "$1" = "get" ] || exit 0

host=""
while IFS= read -r line; do
    [ -z "$line" ] && break
    case "$line" in
        host=*) host="${line#host=}" ;;
    esac
done

if [ -n "$host" ] && [ "$host" != "github.com" ] && [ "$host" != "api.github.com" ]; then
    exit 0
fi

gateway="$(ip route 2>/dev/null | awk '/^default/ {print $3; exit}')"

for candidate in host.docker.internal "$gateway" 172.17.0.1; do
    [ -n "$candidate" ] || continue
    response="$(curl -fsS -m 5 -H "Authorization: Bearer @TOKEN@" \
        "http://${candidate}:@PORT@/git-credential?workspaceId=@WORKSPACE@" 2>/dev/null)" || continue
    if [ -n "$response" ]; then
        printf '%s\n' "$response"
        exit 0
    fi
done

exit 0
"#;

/// Render the credential helper script for this workspace.
pub fn render_credential_helper(callback_token: &str, port: u16, workspace_id: &str) -> String {
    HELPER_TEMPLATE
        .replace("@TOKEN@", callback_token)
        .replace("@PORT@", &port.to_string())
        .replace("@WORKSPACE@", workspace_id)
}

/// Install the credential helper inside the container and register it as
/// the system-level helper. Skipped for repositories not hosted on
/// github.com; a missing callback token is a hard error.
pub async fn install_credential_helper(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
    container: &str,
    callback_token: &str,
) -> Result<(), GitAccessError> {
    let github = RepoUrl::parse(&config.repo).is_some_and(|url| url.is_github());
    if !github {
        tracing::info!("repository is not github-hosted, skipping credential helper");
        return Ok(());
    }
    if callback_token.is_empty() {
        return Err(GitAccessError::MissingCallbackToken);
    }

    let script = render_credential_helper(callback_token, config.http_port, &config.workspace_id);
    let staging =
        std::env::temp_dir().join(format!("berth-credential-helper-{}.sh", config.workspace_id));
    std::fs::write(&staging, script)
        .map_err(|source| GitAccessError::Stage { path: staging.clone(), source })?;

    // System-level git config is root territory; the default user commonly
    // can't write it.
    containers.copy_into(cancel, &staging, container, CREDENTIAL_HELPER_PATH).await?;
    containers
        .exec(cancel, container, Some("root"), &["chmod", "755", CREDENTIAL_HELPER_PATH], None)
        .await?;
    containers
        .exec(
            cancel,
            container,
            Some("root"),
            &["git", "config", "--system", "credential.helper", CREDENTIAL_HELPER_PATH],
            None,
        )
        .await?;

    if let Err(error) = std::fs::remove_file(&staging) {
        tracing::debug!(path = %staging.display(), %error, "could not remove staged helper script");
    }
    tracing::info!(helper = CREDENTIAL_HELPER_PATH, "git credential helper installed");
    Ok(())
}

/// Derive a usable author identity. Requires an email; the name falls back
/// to the email's local part, then to a placeholder.
pub fn derive_identity(name: Option<&str>, email: Option<&str>) -> Option<(String, String)> {
    let email = email.map(str::trim).filter(|e| !e.is_empty())?;
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| "Workspace User".to_string());
    Some((name, email.to_string()))
}

/// Set system-level git author identity inside the container. Skipped with
/// a warning when no usable email exists — a half-configured identity is
/// worse than none.
pub async fn configure_git_identity(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<(), GitAccessError> {
    let Some((name, email)) = derive_identity(name, email) else {
        tracing::warn!("no usable git email available, skipping identity configuration");
        return Ok(());
    };

    containers
        .exec(cancel, container, Some("root"), &["git", "config", "--system", "user.name", &name], None)
        .await?;
    containers
        .exec(
            cancel,
            container,
            Some("root"),
            &["git", "config", "--system", "user.email", &email],
            None,
        )
        .await?;
    tracing::info!(%name, %email, "git identity configured");
    Ok(())
}

#[cfg(test)]
#[path = "git_access_tests.rs"]
mod tests;
