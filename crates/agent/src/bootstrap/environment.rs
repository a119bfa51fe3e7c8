// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment injection: platform metadata and caller-supplied runtime
//! variables/files.
//!
//! Platform metadata is written twice — a profile script for login shells
//! and a plain key=value file for non-shell consumers. Caller-supplied
//! variables and files are validated up front; one bad entry aborts the
//! whole batch before anything is written.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_core::config::CREDENTIAL_HELPER_PATH;
use berth_core::shell::single_quote;
use berth_core::state::{EnvVar, ProjectFile};
use berth_core::AgentConfig;

const PROFILE_SCRIPT: &str = "/etc/profile.d/berth.sh";
const PROJECT_PROFILE_SCRIPT: &str = "/etc/profile.d/berth-project.sh";
const METADATA_FILE: &str = "/etc/berth/environment";

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("invalid environment variable key {key:?}")]
    InvalidKey { key: String },

    #[error("invalid project file path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

/// Write platform metadata into the container: a sourced profile script and
/// a plain key=value file.
pub async fn inject_platform_env(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
    container: &str,
    github_token: Option<&str>,
) -> Result<(), EnvironmentError> {
    let pairs = metadata_pairs(config, github_token);

    let mut profile = String::from("# berth workspace environment\n");
    for (key, value) in &pairs {
        profile.push_str(&format!("export {key}={}\n", single_quote(value)));
    }
    // Recover a token at shell start when none was baked in; the helper
    // serves whatever the control plane currently grants.
    profile.push_str(&format!(
        r#"if [ -z "${{GITHUB_TOKEN:-}}" ] && [ -x {helper} ]; then
    GITHUB_TOKEN="$(printf 'host=github.com\n\n' | {helper} get | sed -n 's/^password=//p' | head -n 1)"
    [ -n "$GITHUB_TOKEN" ] && export GITHUB_TOKEN
fi
"#,
        helper = CREDENTIAL_HELPER_PATH,
    ));

    let mut metadata = String::new();
    for (key, value) in &pairs {
        metadata.push_str(&format!("{key}={value}\n"));
    }

    write_root_file(cancel, containers, container, PROFILE_SCRIPT, &profile).await?;
    write_root_file(cancel, containers, container, METADATA_FILE, &metadata).await?;
    tracing::info!("platform environment injected");
    Ok(())
}

fn metadata_pairs(config: &AgentConfig, github_token: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = vec![
        ("BERTH_API_URL".to_string(), config.control_plane_url.clone()),
        ("BERTH_BRANCH".to_string(), config.branch.clone()),
        ("BERTH_NODE_ID".to_string(), config.node_id.clone()),
        ("BERTH_REPO".to_string(), config.repo.clone()),
        ("BERTH_WORKSPACE_ID".to_string(), config.workspace_id.clone()),
        ("BERTH_WORKSPACE_URL".to_string(), config.workspace_url()),
    ];
    if let Some(token) = github_token.filter(|t| !t.is_empty()) {
        pairs.push(("GITHUB_TOKEN".to_string(), token.to_string()));
    }
    pairs
}

/// Write caller-supplied runtime variables as a profile script. Any invalid
/// key aborts the whole batch before a single byte is written.
pub async fn inject_project_env(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
    vars: &[EnvVar],
) -> Result<(), EnvironmentError> {
    if vars.is_empty() {
        return Ok(());
    }
    for var in vars {
        if !valid_key(&var.key) {
            return Err(EnvironmentError::InvalidKey { key: var.key.clone() });
        }
    }

    let mut script = String::from("# project runtime environment\n");
    for var in vars {
        script.push_str(&format!("export {}={}\n", var.key, single_quote(&var.value)));
    }
    write_root_file(cancel, containers, container, PROJECT_PROFILE_SCRIPT, &script).await?;
    tracing::info!(count = vars.len(), "project environment variables injected");
    Ok(())
}

/// Materialize caller-supplied files inside the container, as the resolved
/// workspace user so home-relative paths land in the right home.
pub async fn write_project_files(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
    container: &str,
    user: Option<&str>,
    files: &[ProjectFile],
) -> Result<(), EnvironmentError> {
    if files.is_empty() {
        return Ok(());
    }
    let targets: Vec<String> = files
        .iter()
        .map(|file| target_expression(config, &file.path))
        .collect::<Result<_, _>>()?;

    for (file, target) in files.iter().zip(&targets) {
        let script = format!("mkdir -p \"$(dirname {target})\" && cat > {target}");
        containers
            .exec_sh(cancel, container, user, &script, Some(&file.content))
            .await?;
    }
    tracing::info!(count = files.len(), "project files written");
    Ok(())
}

/// Resolve a project file path to a quoted shell expression.
///
/// Absolute and home-relative paths are honored as-is; relative paths land
/// under the configured container workspace folder. Traversal is rejected.
fn target_expression(config: &AgentConfig, path: &str) -> Result<String, EnvironmentError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(EnvironmentError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty",
        });
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(EnvironmentError::InvalidPath {
            path: path.to_string(),
            reason: "parent-directory traversal is not allowed",
        });
    }

    if let Some(rest) = trimmed.strip_prefix("~/") {
        return Ok(format!("\"$HOME\"/{}", single_quote(rest)));
    }
    if trimmed.starts_with('/') {
        return Ok(single_quote(trimmed));
    }
    Ok(single_quote(&format!(
        "{}/{}",
        config.container_workspace_folder.trim_end_matches('/'),
        trimmed,
    )))
}

/// Strict POSIX-ish identifier: `[A-Za-z_][A-Za-z0-9_]*`.
fn valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn write_root_file(
    cancel: &CancellationToken,
    containers: &ContainerCli,
    container: &str,
    path: &str,
    content: &str,
) -> Result<(), EnvironmentError> {
    let script = format!("mkdir -p \"$(dirname {path})\" && cat > {path}");
    containers.exec_sh(cancel, container, Some("root"), &script, Some(content)).await?;
    Ok(())
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
