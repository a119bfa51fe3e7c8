// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential bootstrap: redeem the one-time token, persist the result.
//!
//! The bootstrap token is single-use, so the outcome is persisted before
//! anything else runs and every later boot resumes from the state file
//! instead of redeeming again. Transient control-plane trouble is retried
//! with capped exponential backoff; rejections fail immediately.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use berth_adapters::control_plane::{ControlPlaneClient, ControlPlaneError, Redemption};
use berth_adapters::reporter::BootReporter;
use berth_core::state::StateError;
use berth_core::{AgentConfig, BootstrapState};

/// Backoff doubles per attempt up to this ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("no bootstrap token configured and no persisted state present")]
    MissingBootstrapToken,

    #[error(transparent)]
    Redeem(#[from] ControlPlaneError),

    #[error("gave up redeeming bootstrap token after {waited:?}: {source}")]
    DeadlineExceeded {
        waited: Duration,
        #[source]
        source: ControlPlaneError,
    },

    #[error("redeemed workspace {found} does not match configured workspace {expected}")]
    WorkspaceMismatch { expected: String, found: String },

    #[error("control plane returned an empty callback token")]
    MissingCallbackToken,

    /// On-demand provisioning requires a prior boot to have persisted
    /// credentials.
    #[error("workspace {0} has no persisted credentials; boot the VM before provisioning")]
    NotBootstrapped(String),

    #[error("credential bootstrap cancelled")]
    Cancelled,
}

/// Ensure valid credentials exist for this workspace, redeeming the
/// bootstrap token only when no usable persisted state is present.
pub async fn ensure_credentials(
    cancel: &CancellationToken,
    config: &AgentConfig,
    control_plane: &ControlPlaneClient,
    reporter: &dyn BootReporter,
) -> Result<BootstrapState, CredentialError> {
    if let Some(state) = BootstrapState::load(&config.state_file, &config.workspace_id)? {
        tracing::info!(workspace = %config.workspace_id, "reusing persisted bootstrap state");
        reporter.set_token(&state.callback_token);
        return Ok(state);
    }

    let token = config
        .bootstrap_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(CredentialError::MissingBootstrapToken)?;

    let redemption = redeem_with_backoff(cancel, config, control_plane, token).await?;

    if redemption.workspace_id != config.workspace_id {
        return Err(CredentialError::WorkspaceMismatch {
            expected: config.workspace_id.clone(),
            found: redemption.workspace_id,
        });
    }
    if redemption.callback_token.is_empty() {
        return Err(CredentialError::MissingCallbackToken);
    }

    let state = BootstrapState {
        workspace_id: redemption.workspace_id,
        callback_token: redemption.callback_token,
        github_token: redemption.github_token,
        git_user_name: redemption.git_user_name,
        git_user_email: redemption.git_user_email,
    };
    state.save(&config.state_file)?;
    tracing::info!(workspace = %config.workspace_id, "bootstrap credentials redeemed and persisted");
    reporter.set_token(&state.callback_token);
    Ok(state)
}

/// Retry transient redemption failures with exponential backoff, clipping
/// every wait so the deadline is never overshot.
async fn redeem_with_backoff(
    cancel: &CancellationToken,
    config: &AgentConfig,
    control_plane: &ControlPlaneClient,
    token: &str,
) -> Result<Redemption, CredentialError> {
    let deadline = Instant::now() + config.redeem_max_wait;
    let mut delay = config.redeem_initial_delay;

    loop {
        match control_plane.redeem(cancel, token).await {
            Ok(redemption) => return Ok(redemption),
            Err(ControlPlaneError::Cancelled) => return Err(CredentialError::Cancelled),
            Err(error) if error.is_retryable() => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(CredentialError::DeadlineExceeded {
                        waited: config.redeem_max_wait,
                        source: error,
                    });
                }
                let wait = delay.min(deadline - now);
                tracing::warn!(
                    error = %error,
                    retry_in_ms = wait.as_millis() as u64,
                    "credential redemption failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
                delay = (delay * 2).min(BACKOFF_CAP);
            }
            Err(error) => return Err(error.into()),
        }
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
