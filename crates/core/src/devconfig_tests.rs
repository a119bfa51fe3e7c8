// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn round_trip_preserves_unknown_keys_and_order() {
    let raw = r#"{
  "name": "demo",
  "customizations": {
    "vscode": {
      "extensions": ["rust-lang.rust-analyzer"]
    }
  },
  "image": "ghcr.io/acme/dev:1",
  "zzz": 3
}"#;
    let config = DevcontainerConfig::from_json(raw).unwrap();
    let reparsed = DevcontainerConfig::from_json(&config.to_json_pretty()).unwrap();
    assert_eq!(config, reparsed);
    // Order preserved: "name" first, "zzz" last
    let pretty = config.to_json_pretty();
    assert!(pretty.find("name").unwrap() < pretty.find("image").unwrap());
    assert!(pretty.find("image").unwrap() < pretty.find("zzz").unwrap());
}

#[test]
fn top_level_array_is_rejected() {
    assert!(matches!(
        DevcontainerConfig::from_json("[1, 2]"),
        Err(DevconfigError::NotAnObject)
    ));
}

#[yare::parameterized(
    image          = { json!({"image": "ubuntu:24.04"}), true },
    dockerfile     = { json!({"build": {"dockerfile": "Dockerfile"}}), true },
    legacy_docker  = { json!({"dockerFile": "Dockerfile"}), true },
    compose        = { json!({"dockerComposeFile": "docker-compose.yml"}), true },
    compose_list   = { json!({"dockerComposeFile": ["a.yml", "b.yml"]}), true },
    empty_image    = { json!({"image": ""}), false },
    empty_compose  = { json!({"dockerComposeFile": []}), false },
    nothing        = { json!({"name": "x"}), false },
)]
fn runtime_source_detection(value: serde_json::Value, expected: bool) {
    let config = DevcontainerConfig::from_value(value).unwrap();
    assert_eq!(config.has_runtime_source(), expected);
}

#[test]
fn plural_hooks_join_to_singular() {
    let mut config = DevcontainerConfig::from_value(json!({
        "postCreateCommands": ["npm ci", ["cargo", "build", "--all features"]],
        "postStartCommands": [{"server": "npm start", "db": "pg_ctl start"}],
    }))
    .unwrap();

    config.normalize_lifecycle_hooks();

    assert_eq!(
        config.get("postCreateCommand").and_then(|v| v.as_str()),
        Some("npm ci && cargo build '--all features'"),
    );
    assert_eq!(
        config.get("postStartCommand").and_then(|v| v.as_str()),
        Some("npm start && pg_ctl start"),
    );
    assert!(config.get("postCreateCommands").is_none());
    assert!(config.get("postStartCommands").is_none());
}

#[test]
fn existing_singular_hook_is_not_overwritten() {
    let mut config = DevcontainerConfig::from_value(json!({
        "postCreateCommand": "make setup",
        "postCreateCommands": ["npm ci"],
    }))
    .unwrap();

    config.normalize_lifecycle_hooks();

    assert_eq!(config.get("postCreateCommand").and_then(|v| v.as_str()), Some("make setup"));
    assert!(config.get("postCreateCommands").is_none());
}

#[test]
fn empty_plural_hook_is_dropped() {
    let mut config =
        DevcontainerConfig::from_value(json!({ "onCreateCommands": [] })).unwrap();
    config.normalize_lifecycle_hooks();
    assert!(config.get("onCreateCommand").is_none());
    assert!(config.get("onCreateCommands").is_none());
}

#[test]
fn workspace_volume_overrides_mount_and_folder() {
    let mut config = DevcontainerConfig::from_value(json!({
        "image": "ubuntu:24.04",
        "workspaceMount": "source=/home/me/src,target=/workspaces/src,type=bind",
        "workspaceFolder": "/workspaces/src",
    }))
    .unwrap();

    config.set_workspace_volume("berth-ws-ws-42", "/workspaces/project");

    assert_eq!(
        config.get("workspaceMount").and_then(|v| v.as_str()),
        Some("source=berth-ws-ws-42,target=/workspaces/project,type=volume"),
    );
    assert_eq!(
        config.get("workspaceFolder").and_then(|v| v.as_str()),
        Some("/workspaces/project"),
    );
}

#[yare::parameterized(
    remote    = { json!({"remoteUser": "dev"}), Some("dev") },
    container = { json!({"containerUser": "node"}), Some("node") },
    both      = { json!({"remoteUser": "dev", "containerUser": "node"}), Some("dev") },
    empty     = { json!({"remoteUser": ""}), None },
    none      = { json!({}), None },
)]
fn remote_user_accessor(value: serde_json::Value, expected: Option<&str>) {
    let config = DevcontainerConfig::from_value(value).unwrap();
    assert_eq!(config.remote_user(), expected);
}
