// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Final readiness report to the control plane.
//!
//! `recovery` is reported whenever this attempt fell back to the default
//! image *or* a build-error marker exists from a prior attempt. The marker
//! is snapshotted before the build phase gets a chance to clear it, so a
//! boot that recovers right after a failed one still reports recovery once
//! more — over-reporting is preferred to hiding a broken primary build.

use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use berth_adapters::control_plane::{ControlPlaneClient, ControlPlaneError, ReadyStatus};
use berth_core::AgentConfig;

/// Whether a build-error marker is present. Inspection failures are logged
/// and treated as "no marker".
pub fn marker_present(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(_) => true,
        Err(error) if error.kind() == io::ErrorKind::NotFound => false,
        Err(error) => {
            tracing::warn!(marker = %path.display(), %error, "could not inspect build-error marker");
            false
        }
    }
}

/// Report final status. `in_recovery` is the pre-computed fallback-or-marker
/// decision. Non-2xx from the ready endpoint is a hard error.
pub async fn report_ready(
    cancel: &CancellationToken,
    config: &AgentConfig,
    control_plane: &ControlPlaneClient,
    callback_token: &str,
    in_recovery: bool,
) -> Result<ReadyStatus, ControlPlaneError> {
    let status = if in_recovery { ReadyStatus::Recovery } else { ReadyStatus::Running };
    control_plane.report_ready(cancel, &config.workspace_id, callback_token, status).await?;
    tracing::info!(status = status.as_str(), "reported workspace ready");
    Ok(status)
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;
