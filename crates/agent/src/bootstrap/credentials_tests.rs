// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bootstrap::test_support::test_config;
use berth_adapters::testing::{http_response, MockControlPlane};
use berth_adapters::RecordingReporter;
use std::time::Instant as StdInstant;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

fn redemption_body(workspace_id: &str) -> String {
    format!(
        r#"{{"workspaceId": "{workspace_id}", "callbackToken": "cbt-secret",
            "githubToken": "ghs_token", "gitUserEmail": "dev@example.test"}}"#
    )
}

#[tokio::test]
async fn valid_persisted_state_skips_redemption() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockControlPlane::start(vec![http_response(200, "{}")]).await.unwrap();
    let config = test_config(dir.path(), server.base_url());
    let reporter = RecordingReporter::new();

    let state = BootstrapState {
        workspace_id: "ws-42".to_string(),
        callback_token: "cbt-persisted".to_string(),
        github_token: None,
        git_user_name: None,
        git_user_email: None,
    };
    state.save(&config.state_file).unwrap();

    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let resumed = ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap();

    assert_eq!(resumed.callback_token, "cbt-persisted");
    assert_eq!(server.request_count(), 0);
    assert_eq!(reporter.tokens(), vec!["cbt-persisted".to_string()]);
}

#[tokio::test]
async fn transient_failures_retry_with_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockControlPlane::start(vec![
        http_response(500, "flaky"),
        http_response(500, "flaky"),
        http_response(200, &redemption_body("ws-42")),
    ])
    .await
    .unwrap();
    let mut config = test_config(dir.path(), server.base_url());
    config.redeem_initial_delay = Duration::from_millis(50);
    config.redeem_max_wait = Duration::from_secs(5);
    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let reporter = RecordingReporter::new();

    let start = StdInstant::now();
    let state = ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(state.callback_token, "cbt-secret");
    assert_eq!(server.request_count(), 3);
    // Two waits on the schedule: 50ms then 100ms.
    assert!(elapsed >= Duration::from_millis(150), "elapsed {elapsed:?}");
    assert!(elapsed < config.redeem_max_wait);
}

#[tokio::test]
async fn rejection_fails_after_exactly_one_call() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockControlPlane::start(vec![http_response(404, "gone")]).await.unwrap();
    let mut config = test_config(dir.path(), server.base_url());
    // A wide margin so the elapsed-time assertion can't flake: the single
    // local round-trip is far under half a second.
    config.redeem_initial_delay = Duration::from_millis(500);
    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let reporter = RecordingReporter::new();

    let start = StdInstant::now();
    let err = ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap_err();

    assert!(matches!(err, CredentialError::Redeem(ControlPlaneError::Rejected { .. })));
    assert_eq!(server.request_count(), 1);
    // No retry wait elapsed.
    assert!(start.elapsed() < config.redeem_initial_delay);
}

#[tokio::test]
async fn persistent_failure_hits_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockControlPlane::start(vec![http_response(503, "down")]).await.unwrap();
    let mut config = test_config(dir.path(), server.base_url());
    config.redeem_initial_delay = Duration::from_millis(100);
    config.redeem_max_wait = Duration::from_millis(250);
    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let reporter = RecordingReporter::new();

    let start = StdInstant::now();
    let err = ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap_err();

    assert!(matches!(err, CredentialError::DeadlineExceeded { .. }));
    // Waits are clipped: total sleep can never overshoot the deadline by
    // more than one request round-trip.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn workspace_mismatch_is_terminal_and_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let server =
        MockControlPlane::start(vec![http_response(200, &redemption_body("ws-other"))])
            .await
            .unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let reporter = RecordingReporter::new();

    let err = ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap_err();
    assert!(matches!(err, CredentialError::WorkspaceMismatch { .. }));
    assert!(!config.state_file.exists());
    assert!(reporter.tokens().is_empty());
}

#[tokio::test]
async fn empty_callback_token_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"{"workspaceId": "ws-42", "callbackToken": ""}"#;
    let server = MockControlPlane::start(vec![http_response(200, body)]).await.unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();

    let err = ensure_credentials(&cancel(), &config, &client, &RecordingReporter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::MissingCallbackToken));
}

#[tokio::test]
async fn successful_redemption_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let server =
        MockControlPlane::start(vec![http_response(200, &redemption_body("ws-42"))]).await.unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();
    let reporter = RecordingReporter::new();

    ensure_credentials(&cancel(), &config, &client, &reporter).await.unwrap();

    let persisted = BootstrapState::load(&config.state_file, "ws-42").unwrap().unwrap();
    assert_eq!(persisted.callback_token, "cbt-secret");
    assert_eq!(persisted.github_token.as_deref(), Some("ghs_token"));
    assert_eq!(reporter.tokens(), vec!["cbt-secret".to_string()]);
}

#[tokio::test]
async fn no_token_and_no_state_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockControlPlane::start(vec![http_response(200, "{}")]).await.unwrap();
    let mut config = test_config(dir.path(), server.base_url());
    config.bootstrap_token = None;
    let client = ControlPlaneClient::new(server.base_url()).unwrap();

    let err = ensure_credentials(&cancel(), &config, &client, &RecordingReporter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::MissingBootstrapToken));
    assert_eq!(server.request_count(), 0);
}
