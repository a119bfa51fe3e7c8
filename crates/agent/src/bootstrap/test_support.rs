// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for bootstrap tests.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use berth_core::AgentConfig;

static FAKE_BUILD_CLI: OnceLock<()> = OnceLock::new();

/// Install a stub `devcontainer` executable on PATH (once per process) so
/// the builder's PATH wait returns immediately. The scripted runner
/// intercepts the actual invocations; the file only needs to exist.
pub fn ensure_build_cli_on_path() {
    FAKE_BUILD_CLI.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("berth-agent-test-bin-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("devcontainer");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let mut paths: Vec<_> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        paths.push(dir);
        std::env::set_var("PATH", std::env::join_paths(paths).unwrap());
    });
}

/// A config rooted in a temp dir, pointing at a test control plane.
pub fn test_config(dir: &Path, control_plane_url: &str) -> AgentConfig {
    AgentConfig {
        control_plane_url: control_plane_url.to_string(),
        bootstrap_token: Some("boot-token".to_string()),
        workspace_id: "ws-42".to_string(),
        node_id: "node-1".to_string(),
        repo: "octo/repo".to_string(),
        branch: "main".to_string(),
        workspace_dir: dir.join("workspace"),
        state_file: dir.join("state/bootstrap.json"),
        http_port: 39217,
        container_label_key: "sh.berth.workspace".to_string(),
        volume_prefix: "berth-ws-".to_string(),
        use_volume: false,
        container_workspace_folder: "/workspaces/project".to_string(),
        default_image: "ghcr.io/berth/workspace:latest".to_string(),
        helper_image: "alpine:3.20".to_string(),
        remote_user: None,
        extra_features: Vec::new(),
        redeem_max_wait: Duration::from_secs(5),
        redeem_initial_delay: Duration::from_millis(20),
        cli_poll_interval: Duration::from_millis(20),
    }
}
