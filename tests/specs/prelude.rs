// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for end-to-end specs: a scripted control plane and a
//! sandbox with stub CLIs on PATH.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Render a minimal HTTP/1.1 response.
pub fn http_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len(),
    )
}

pub fn redemption_body(workspace_id: &str) -> String {
    format!(
        r#"{{"workspaceId": "{workspace_id}", "callbackToken": "cbt-secret",
            "githubToken": "ghs_token", "gitUserEmail": "dev@example.test"}}"#
    )
}

/// A scripted control plane on a real TCP port: each connection gets the
/// next canned response (the last repeats); raw request text is recorded.
pub struct MockControlPlane {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockControlPlane {
    pub fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock control plane");
        let addr = listener.local_addr().expect("local addr");
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        std::thread::spawn(move || {
            let mut served = 0usize;
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Ok(request) = read_request(&mut stream) else { continue };
                seen.lock().expect("requests lock").push(request);

                let response = responses
                    .get(served.min(responses.len().saturating_sub(1)))
                    .cloned()
                    .unwrap_or_else(|| http_response(500, "{}"));
                served += 1;
                let _ = stream.write_all(response.as_bytes());
            }
        });

        Self { base_url: format!("http://{addr}"), requests }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(headers_end) = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4) {
            let headers = String::from_utf8_lossy(&buf[..headers_end]).to_string();
            let body_len = headers
                .lines()
                .find(|line| line.to_ascii_lowercase().starts_with("content-length:"))
                .and_then(|line| line.split(':').nth(1))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() - headers_end >= body_len {
                break;
            }
        }
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

const DOCKER_STUB: &str = r#"#!/bin/sh
echo "docker $*" >> "$BERTH_TEST_LOG"
case "$*" in
    ps*)
        [ -f "$BERTH_TEST_STATE/container-up" ] && echo cntr123
        ;;
    *"id -un"*) echo dev ;;
    *"id -u dev"*) echo 1000 ;;
    *"id -g dev"*) echo 1000 ;;
    *"stat -c"*) echo 1000:1000 ;;
    inspect*) echo "<no value>" ;;
    exec*"cat > "*) cat > /dev/null ;;
    run*"cat > "*) cat > /dev/null ;;
esac
exit 0
"#;

const GIT_STUB: &str = r#"#!/bin/sh
echo "git $*" >> "$BERTH_TEST_LOG"
if [ "$1" = "clone" ]; then
    for dest do :; done
    mkdir -p "$dest/.git"
    if [ -n "$BERTH_TEST_DEVCONTAINER" ]; then
        mkdir -p "$dest/.devcontainer"
        printf '%s' "$BERTH_TEST_DEVCONTAINER" > "$dest/.devcontainer/devcontainer.json"
    fi
fi
exit 0
"#;

const DEVCONTAINER_STUB: &str = r#"#!/bin/sh
echo "devcontainer $*" >> "$BERTH_TEST_LOG"
case "$1" in
    up)
        if [ -n "$BERTH_TEST_FAIL_PRIMARY_UP" ]; then
            case "$*" in
                *--override-config*) : ;;
                *)
                    echo "$BERTH_TEST_FAIL_PRIMARY_UP"
                    exit 1
                    ;;
            esac
        fi
        touch "$BERTH_TEST_STATE/container-up"
        ;;
    read-configuration)
        echo '{"mergedConfiguration":{"image":"ghcr.io/acme/dev:1","remoteUser":"dev"}}'
        ;;
esac
exit 0
"#;

/// A sandboxed workspace: temp dirs, stub CLIs, and the environment the
/// agent binary runs with.
pub struct Sandbox {
    temp: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("create sandbox");
        let bin = temp.path().join("bin");
        std::fs::create_dir_all(&bin).expect("create bin dir");
        std::fs::create_dir_all(temp.path().join("test-state")).expect("create test state");

        for (name, content) in
            [("docker", DOCKER_STUB), ("git", GIT_STUB), ("devcontainer", DEVCONTAINER_STUB)]
        {
            let path = bin.join(name);
            std::fs::write(&path, content).expect("write stub");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                    .expect("chmod stub");
            }
        }
        Self { temp }
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.temp.path().join("workspace")
    }

    pub fn state_file(&self) -> PathBuf {
        self.temp.path().join("state/bootstrap.json")
    }

    pub fn marker_path(&self) -> PathBuf {
        self.workspace_dir().join(".berth-build-error.log")
    }

    /// Lines the stub CLIs logged, in invocation order.
    pub fn cli_log(&self) -> Vec<String> {
        std::fs::read_to_string(self.temp.path().join("cli.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// A `berthd` command wired to this sandbox and the given control plane.
    pub fn berthd(&self, control_plane_url: &str) -> assert_cmd::Command {
        let path = format!(
            "{}:{}",
            self.temp.path().join("bin").display(),
            std::env::var("PATH").unwrap_or_default(),
        );
        let mut cmd = assert_cmd::Command::cargo_bin("berthd").expect("berthd binary");
        cmd.env_clear()
            .env("PATH", path)
            .env("HOME", self.temp.path())
            .env("BERTH_TEST_LOG", self.temp.path().join("cli.log"))
            .env("BERTH_TEST_STATE", self.temp.path().join("test-state"))
            .env("BERTH_CONTROL_PLANE_URL", control_plane_url)
            .env("BERTH_BOOTSTRAP_TOKEN", "boot-token")
            .env("BERTH_WORKSPACE_ID", "ws-42")
            .env("BERTH_NODE_ID", "node-1")
            .env("BERTH_REPO", "octo/repo")
            .env("BERTH_BRANCH", "main")
            .env("BERTH_WORKSPACE_DIR", self.workspace_dir())
            .env("BERTH_STATE_FILE", self.state_file())
            .env("BERTH_STATE_DIR", self.temp.path().join("state"))
            .env("BERTH_REDEEM_MAX_WAIT_MS", "2000")
            .env("BERTH_REDEEM_INITIAL_DELAY_MS", "50")
            .env("BERTH_CLI_POLL_MS", "50")
            .timeout(std::time::Duration::from_secs(60));
        cmd
    }
}
