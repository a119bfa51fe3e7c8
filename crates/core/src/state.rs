// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted bootstrap state and per-call provisioning state.
//!
//! `BootstrapState` is written once after a successful credential redemption
//! and read on every subsequent boot so the one-time bootstrap token is never
//! redeemed twice. It is the only durable state the agent owns besides the
//! build-error marker; writes are atomic (temp file + rename) and the file is
//! restricted to the owning user.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// The persisted state belongs to a different workspace. Stale state from
    /// a recycled VM image must never be reused.
    #[error("persisted state belongs to workspace {found}, expected {expected}")]
    WorkspaceMismatch { expected: String, found: String },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Credentials and identity redeemed from the control plane, persisted so a
/// rebooted VM can resume without a second redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapState {
    pub workspace_id: String,
    pub callback_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user_email: Option<String>,
}

impl BootstrapState {
    /// Load persisted state for `expected_workspace`.
    ///
    /// Returns `Ok(None)` when the file is missing, unreadable, unparsable,
    /// or missing either required token — all of those mean "redeem again".
    /// A parseable file for a *different* workspace is an error: redeeming
    /// this VM's token would attach it to the wrong workspace.
    pub fn load(path: &Path, expected_workspace: &str) -> Result<Option<Self>, StateError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let state: Self = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(_) => return Ok(None),
        };
        if state.workspace_id.is_empty() || state.callback_token.is_empty() {
            return Ok(None);
        }
        if state.workspace_id != expected_workspace {
            return Err(StateError::WorkspaceMismatch {
                expected: expected_workspace.to_string(),
                found: state.workspace_id,
            });
        }
        Ok(Some(state))
    }

    /// Persist atomically with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let write_err =
            |source: io::Error| StateError::Write { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
            restrict_permissions(parent, 0o700).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        restrict_permissions(&tmp, 0o600).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// A single runtime environment variable supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// A file to materialize inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

/// Caller-supplied state for one on-demand provisioning call.
///
/// Never persisted; consumed once. Tokens and identity here take precedence
/// over whatever the boot-time redemption stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionState {
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub git_user_name: Option<String>,
    #[serde(default)]
    pub git_user_email: Option<String>,
    #[serde(default)]
    pub project_env_vars: Vec<EnvVar>,
    #[serde(default)]
    pub project_files: Vec<ProjectFile>,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
