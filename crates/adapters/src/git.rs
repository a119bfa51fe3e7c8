// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-control CLI driver (host-side operations only).
//!
//! In-container git configuration goes through the container driver; this
//! module only clones onto the host and rewrites the remote afterwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::subprocess::{ensure_success, CommandRunner, CommandSpec, SubprocessError};

const CLONE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

/// Driver for the version-control CLI.
#[derive(Clone)]
pub struct GitCli {
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Clone `url` at `branch` into `dest`.
    pub async fn clone_branch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<(), GitError> {
        let spec = CommandSpec::new(
            "git",
            ["clone", "--branch", branch, url, &dest.display().to_string()],
        )
        .with_timeout(CLONE_TIMEOUT);
        let output = self.runner.run(cancel, spec.clone()).await?;
        ensure_success(&spec, output)?;
        Ok(())
    }

    /// Point `origin` at `url`. Used to strip the token from the clone URL
    /// so no secret survives in repository metadata.
    pub async fn set_remote_url(
        &self,
        cancel: &CancellationToken,
        repo_dir: &Path,
        url: &str,
    ) -> Result<(), GitError> {
        let spec = CommandSpec::new(
            "git",
            ["-C", &repo_dir.display().to_string(), "remote", "set-url", "origin", url],
        );
        let output = self.runner.run(cancel, spec.clone()).await?;
        ensure_success(&spec, output)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
