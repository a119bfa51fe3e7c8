// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bootstrap::test_support::test_config;
use berth_adapters::testing::{http_response, MockControlPlane};

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

#[test]
fn marker_presence_matches_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marker.log");
    assert!(!marker_present(&path));
    std::fs::write(&path, "boom").unwrap();
    assert!(marker_present(&path));
}

#[tokio::test]
async fn running_is_reported_when_not_in_recovery() {
    let server = MockControlPlane::start(vec![http_response(200, "{}")]).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();

    let status = report_ready(&cancel(), &config, &client, "cbt-secret", false).await.unwrap();
    assert_eq!(status, ReadyStatus::Running);
    assert!(server.requests()[0].contains(r#"{"status":"running"}"#));
}

#[tokio::test]
async fn recovery_is_reported_when_flagged() {
    let server = MockControlPlane::start(vec![http_response(200, "{}")]).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();

    let status = report_ready(&cancel(), &config, &client, "cbt-secret", true).await.unwrap();
    assert_eq!(status, ReadyStatus::Recovery);
    assert!(server.requests()[0].contains(r#"{"status":"recovery"}"#));
}

#[tokio::test]
async fn ready_endpoint_failure_is_fatal() {
    let server = MockControlPlane::start(vec![http_response(503, "down")]).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), server.base_url());
    let client = ControlPlaneClient::new(server.base_url()).unwrap();

    let err = report_ready(&cancel(), &config, &client, "cbt-secret", false).await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::ReadyFailed { status: 503, .. }));
}
