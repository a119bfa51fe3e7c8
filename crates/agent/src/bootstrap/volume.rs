// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace persistent volume management.
//!
//! The volume replaces the default bind mount so file ownership inside the
//! container never depends on host uids. Naming is deterministic
//! ([`AgentConfig::volume_name`]) so deletion workflows can compute it
//! without reading any state.

use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_core::AgentConfig;

/// Create this workspace's volume. Safe to repeat across reboots.
pub async fn ensure_volume_ready(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
) -> Result<(), ContainerError> {
    let name = config.volume_name();
    containers.volume_create(cancel, &name).await?;
    tracing::debug!(volume = %name, "workspace volume ready");
    Ok(())
}

/// Force-remove this workspace's volume. Safe to call when absent.
pub async fn remove_volume(
    cancel: &CancellationToken,
    config: &AgentConfig,
    containers: &ContainerCli,
) -> Result<(), ContainerError> {
    containers.volume_remove(cancel, &config.volume_name()).await
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
