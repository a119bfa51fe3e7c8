// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent binary.
//!
//! The configuration resolver that normally hands the agent its tunables is
//! an external collaborator; when running standalone, `berthd` resolves the
//! same values from `BERTH_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use berth_core::AgentConfig;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Resolve state directory: BERTH_STATE_DIR > XDG_STATE_HOME/berth > ~/.local/state/berth
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BERTH_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("berth");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")).join(".local/state/berth")
}

/// Build the agent configuration from `BERTH_*` environment variables.
pub fn agent_config() -> Result<AgentConfig, EnvError> {
    let control_plane_url = required("BERTH_CONTROL_PLANE_URL")?;
    let workspace_id = required("BERTH_WORKSPACE_ID")?;
    let workspace_dir = optional("BERTH_WORKSPACE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/workspaces").join(&workspace_id));

    Ok(AgentConfig {
        control_plane_url,
        bootstrap_token: optional("BERTH_BOOTSTRAP_TOKEN"),
        node_id: optional("BERTH_NODE_ID").unwrap_or_else(|| "node-0".to_string()),
        repo: optional("BERTH_REPO").unwrap_or_default(),
        branch: optional("BERTH_BRANCH").unwrap_or_else(|| "main".to_string()),
        workspace_dir,
        state_file: optional("BERTH_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir().join("bootstrap.json")),
        http_port: parsed("BERTH_HTTP_PORT", 39217)?,
        container_label_key: optional("BERTH_LABEL_KEY")
            .unwrap_or_else(|| "sh.berth.workspace".to_string()),
        volume_prefix: optional("BERTH_VOLUME_PREFIX").unwrap_or_else(|| "berth-ws-".to_string()),
        use_volume: flag("BERTH_USE_VOLUME"),
        container_workspace_folder: optional("BERTH_CONTAINER_WORKSPACE_FOLDER")
            .unwrap_or_else(|| "/workspaces/project".to_string()),
        default_image: optional("BERTH_DEFAULT_IMAGE")
            .unwrap_or_else(|| "mcr.microsoft.com/devcontainers/universal:2".to_string()),
        helper_image: optional("BERTH_HELPER_IMAGE").unwrap_or_else(|| "alpine:3.20".to_string()),
        remote_user: optional("BERTH_REMOTE_USER"),
        extra_features: optional("BERTH_EXTRA_FEATURES")
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default(),
        redeem_max_wait: Duration::from_millis(parsed("BERTH_REDEEM_MAX_WAIT_MS", 120_000)?),
        redeem_initial_delay: Duration::from_millis(parsed("BERTH_REDEEM_INITIAL_DELAY_MS", 1_000)?),
        cli_poll_interval: Duration::from_millis(parsed("BERTH_CLI_POLL_MS", 1_000)?),
        workspace_id,
    })
}

fn required(name: &'static str) -> Result<String, EnvError> {
    optional(name).ok_or(EnvError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn flag(name: &str) -> bool {
    optional(name).is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, EnvError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => {
            value.parse().map_err(|_| EnvError::Invalid { name, value })
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
