// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved agent configuration.
//!
//! All tunables are resolved by the caller (environment, control plane hand-
//! off) before the bootstrap pipeline starts; the pipeline itself never reads
//! the environment. Derived names (volume, discovery label, marker path) live
//! here so other workflows — e.g. workspace deletion — can compute them
//! without re-deriving workspace state.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed filename of the build-error marker, both on the host (inside the
/// workspace directory) and mirrored into the volume root.
pub const BUILD_ERROR_MARKER: &str = ".berth-build-error.log";

/// Container path the helper script is installed at.
pub const CREDENTIAL_HELPER_PATH: &str = "/usr/local/bin/berth-credential-helper";

/// Configuration for one workspace bootstrap.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the control plane, e.g. `https://api.berth.sh`.
    pub control_plane_url: String,
    /// One-time bootstrap token. Absent when resuming from persisted state.
    pub bootstrap_token: Option<String>,
    /// Workspace this VM (or node-mode slot) belongs to.
    pub workspace_id: String,
    /// Node identifier, injected into the container environment.
    pub node_id: String,
    /// Repository to provision, `owner/repo` or a full URL. Empty = none.
    pub repo: String,
    /// Branch to clone.
    pub branch: String,
    /// Host path the repository is cloned to.
    pub workspace_dir: PathBuf,
    /// Path of the persisted bootstrap state file.
    pub state_file: PathBuf,
    /// Port of the agent's own HTTP endpoint (serves `/git-credential`).
    pub http_port: u16,
    /// Label key used to discover this workspace's container.
    pub container_label_key: String,
    /// Prefix for the per-workspace named volume.
    pub volume_prefix: String,
    /// Mount the workspace from a named volume instead of a bind mount.
    pub use_volume: bool,
    /// Workspace folder inside the container.
    pub container_workspace_folder: String,
    /// Image used when the repository's own devcontainer build fails.
    pub default_image: String,
    /// Image for disposable helper containers (volume seeding, marker copy).
    pub helper_image: String,
    /// Operator-declared container user. Wins the user-detection cascade and
    /// is declared as `remoteUser` in the fallback configuration.
    pub remote_user: Option<String>,
    /// Extra devcontainer features added to the fallback configuration.
    pub extra_features: Vec<String>,
    /// Total time budget for credential redemption retries.
    pub redeem_max_wait: Duration,
    /// First retry delay; doubles per attempt, capped at 30s.
    pub redeem_initial_delay: Duration,
    /// Interval between checks while waiting for the build CLI on PATH.
    pub cli_poll_interval: Duration,
}

impl AgentConfig {
    /// Deterministic name of this workspace's persistent volume.
    pub fn volume_name(&self) -> String {
        format!("{}{}", self.volume_prefix, self.workspace_id)
    }

    /// `key=value` label selector identifying this workspace's container.
    pub fn container_label(&self) -> String {
        format!("{}={}", self.container_label_key, self.workspace_id)
    }

    /// Host path of the build-error marker.
    pub fn marker_path(&self) -> PathBuf {
        self.workspace_dir.join(BUILD_ERROR_MARKER)
    }

    /// Browser URL of this workspace on the control plane.
    pub fn workspace_url(&self) -> String {
        format!("{}/workspaces/{}", self.control_plane_url.trim_end_matches('/'), self.workspace_id)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
