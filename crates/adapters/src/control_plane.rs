// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control plane HTTP client.
//!
//! Two calls: one-time bootstrap token redemption and the final readiness
//! report. Redemption failures are classified so the caller can decide
//! whether to retry; the classification lives here, the backoff loop lives
//! with the caller.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// 401/403/404 or any other terminal status — the token is bad or the
    /// workspace is gone; retrying cannot help.
    #[error("bootstrap rejected by control plane ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// 5xx or 429 — the control plane is struggling; retry with backoff.
    #[error("control plane unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    /// Connection/DNS/TLS trouble — retryable.
    #[error("control plane transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// 2xx with a body that doesn't match the contract — terminal.
    #[error("control plane returned an invalid response body: {0}")]
    InvalidBody(#[source] reqwest::Error),

    #[error("ready endpoint returned {status}: {body}")]
    ReadyFailed { status: u16, body: String },

    #[error("control plane request cancelled")]
    Cancelled,
}

impl ControlPlaneError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Transport(_))
    }
}

/// Result of redeeming a bootstrap token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub workspace_id: String,
    pub callback_token: String,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub git_user_name: Option<String>,
    #[serde(default)]
    pub git_user_email: Option<String>,
    #[serde(default)]
    pub control_plane_url: Option<String>,
}

/// Final workspace status reported to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStatus {
    Running,
    Recovery,
}

impl ReadyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyStatus::Running => "running",
            ReadyStatus::Recovery => "recovery",
        }
    }
}

/// HTTP client for the control plane API.
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ControlPlaneError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ControlPlaneError::Transport)?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    /// Exchange a one-time bootstrap token for workspace credentials.
    pub async fn redeem(
        &self,
        cancel: &CancellationToken,
        bootstrap_token: &str,
    ) -> Result<Redemption, ControlPlaneError> {
        let url = format!("{}/api/bootstrap/{}", self.base_url, bootstrap_token);
        let request = self.http.post(&url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlPlaneError::Cancelled),
            response = request => response.map_err(ControlPlaneError::Transport)?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }
        response.json::<Redemption>().await.map_err(ControlPlaneError::InvalidBody)
    }

    /// Report the workspace's final status. Non-2xx is a hard error — the
    /// control plane never learning about this workspace is worse than the
    /// agent dying loudly.
    pub async fn report_ready(
        &self,
        cancel: &CancellationToken,
        workspace_id: &str,
        callback_token: &str,
        status: ReadyStatus,
    ) -> Result<(), ControlPlaneError> {
        let url = format!("{}/api/workspaces/{}/ready", self.base_url, workspace_id);
        let request = self
            .http
            .post(&url)
            .bearer_auth(callback_token)
            .json(&serde_json::json!({ "status": status.as_str() }))
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlPlaneError::Cancelled),
            response = request => response.map_err(ControlPlaneError::Transport)?,
        };

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::ReadyFailed { status: http_status.as_u16(), body });
        }
        Ok(())
    }
}

/// 5xx and 429 are worth retrying; everything else is terminal.
fn classify_failure(status: u16, body: String) -> ControlPlaneError {
    if status >= 500 || status == 429 {
        ControlPlaneError::Unavailable { status, body }
    } else {
        ControlPlaneError::Rejected { status, body }
    }
}

#[cfg(test)]
#[path = "control_plane_tests.rs"]
mod tests;
