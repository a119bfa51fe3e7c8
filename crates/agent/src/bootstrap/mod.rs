// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bootstrap pipeline.
//!
//! One strictly sequential flow per workspace. Two entry points share the
//! same phases in the same order: [`Bootstrap::run_boot`] for whole-VM boot
//! (redeems credentials, primes volume permissions) and
//! [`Bootstrap::provision_node`] for on-demand provisioning (credentials
//! must already be persisted; caller supplies per-call state). Every phase
//! start/success/failure is mirrored to the boot reporter so the control
//! plane UI can show which phase a failed bootstrap died in.

pub mod builder;
pub mod credentials;
pub mod environment;
pub mod git_access;
pub mod readiness;
pub mod repository;
pub mod user;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use berth_adapters::container::{ContainerCli, ContainerError};
use berth_adapters::control_plane::{ControlPlaneClient, ControlPlaneError};
use berth_adapters::devcontainer::DevcontainerCli;
use berth_adapters::git::GitCli;
use berth_adapters::reporter::{BootPhase, BootReporter, PhaseStatus};
use berth_adapters::subprocess::CommandRunner;
use berth_core::{AgentConfig, BootstrapState, ProvisionState};

use builder::{BuildError, DevcontainerBuilder};
use credentials::CredentialError;
use environment::EnvironmentError;
use git_access::GitAccessError;
use repository::RepositoryError;
use user::OwnershipError;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("credential bootstrap failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("volume provisioning failed: {0}")]
    Volume(#[from] ContainerError),

    #[error("repository provisioning failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("environment build failed: {0}")]
    Build(#[from] BuildError),

    #[error("ownership reconciliation failed: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("git access setup failed: {0}")]
    GitAccess(#[from] GitAccessError),

    #[error("environment injection failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("readiness report failed: {0}")]
    Ready(#[from] ControlPlaneError),

    #[error("failed to build control plane client: {0}")]
    Client(#[source] ControlPlaneError),
}

/// Effective credentials for one provisioning pass.
#[derive(Debug, Clone)]
struct Credentials {
    callback_token: String,
    github_token: Option<String>,
    git_user_name: Option<String>,
    git_user_email: Option<String>,
}

impl Credentials {
    fn from_state(state: &BootstrapState) -> Self {
        Self {
            callback_token: state.callback_token.clone(),
            github_token: state.github_token.clone(),
            git_user_name: state.git_user_name.clone(),
            git_user_email: state.git_user_email.clone(),
        }
    }

    /// Per-call provisioning state wins over what boot-time redemption stored.
    fn merged(state: &BootstrapState, provision: &ProvisionState) -> Self {
        Self {
            callback_token: state.callback_token.clone(),
            github_token: provision.github_token.clone().or_else(|| state.github_token.clone()),
            git_user_name: provision.git_user_name.clone().or_else(|| state.git_user_name.clone()),
            git_user_email: provision
                .git_user_email
                .clone()
                .or_else(|| state.git_user_email.clone()),
        }
    }
}

/// The workspace bootstrap orchestrator.
pub struct Bootstrap {
    config: AgentConfig,
    containers: ContainerCli,
    git: GitCli,
    devcontainers: DevcontainerCli,
    control_plane: ControlPlaneClient,
    reporter: Arc<dyn BootReporter>,
}

impl Bootstrap {
    pub fn new(
        config: AgentConfig,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn BootReporter>,
    ) -> Result<Self, BootstrapError> {
        let control_plane = ControlPlaneClient::new(config.control_plane_url.clone())
            .map_err(BootstrapError::Client)?;
        Ok(Self {
            containers: ContainerCli::new(runner.clone()),
            git: GitCli::new(runner.clone()),
            devcontainers: DevcontainerCli::new(runner, config.cli_poll_interval),
            control_plane,
            reporter,
            config,
        })
    }

    /// Whole-VM flow, invoked once at boot.
    pub async fn run_boot(&self, cancel: &CancellationToken) -> Result<(), BootstrapError> {
        tracing::info!(workspace = %self.config.workspace_id, "starting workspace bootstrap");
        let state = self
            .phase(
                BootPhase::Credentials,
                "redeeming workspace credentials",
                credentials::ensure_credentials(
                    cancel,
                    &self.config,
                    &self.control_plane,
                    self.reporter.as_ref(),
                ),
            )
            .await?;
        self.provision_inner(cancel, Credentials::from_state(&state), None, true).await
    }

    /// On-demand flow for one workspace provisioning request. Credentials
    /// must already be persisted from a prior boot; `provision` supplies
    /// per-call tokens, identity, and project environment.
    pub async fn provision_node(
        &self,
        cancel: &CancellationToken,
        provision: ProvisionState,
    ) -> Result<(), BootstrapError> {
        tracing::info!(workspace = %self.config.workspace_id, "provisioning workspace on demand");
        let state = self
            .phase(BootPhase::Credentials, "loading persisted workspace credentials", async {
                BootstrapState::load(&self.config.state_file, &self.config.workspace_id)
                    .map_err(CredentialError::State)?
                    .ok_or_else(|| {
                        CredentialError::NotBootstrapped(self.config.workspace_id.clone())
                    })
            })
            .await?;
        self.reporter.set_token(&state.callback_token);

        let creds = Credentials::merged(&state, &provision);
        self.provision_inner(cancel, creds, Some(&provision), false).await
    }

    async fn provision_inner(
        &self,
        cancel: &CancellationToken,
        creds: Credentials,
        provision: Option<&ProvisionState>,
        prime_permissions: bool,
    ) -> Result<(), BootstrapError> {
        if self.config.use_volume {
            self.phase(
                BootPhase::Volume,
                "provisioning workspace volume",
                volume::ensure_volume_ready(cancel, &self.config, &self.containers),
            )
            .await?;
        }

        self.phase(
            BootPhase::Repository,
            "provisioning repository",
            repository::ensure_repository_ready(
                cancel,
                &self.config,
                &self.git,
                &self.containers,
                creds.github_token.as_deref(),
                prime_permissions,
            ),
        )
        .await?;

        // Snapshot before the build phase clears it: a prior boot's failure
        // still counts as recovery for this report.
        let had_marker = readiness::marker_present(&self.config.marker_path());

        let outcome = self
            .phase(BootPhase::Build, "building development environment", async {
                DevcontainerBuilder::new(&self.config, &self.containers, &self.devcontainers)
                    .ensure_environment(cancel)
                    .await
            })
            .await?;

        let user = user::resolve_container_user(
            cancel,
            &self.config,
            &self.containers,
            &self.devcontainers,
            &outcome.container,
            outcome.merged_config.as_ref(),
        )
        .await;
        let workspace_folder = outcome
            .merged_config
            .as_ref()
            .and_then(|m| m.get("workspaceFolder"))
            .and_then(|v| v.as_str())
            .unwrap_or(&self.config.container_workspace_folder)
            .to_string();

        self.phase(
            BootPhase::Ownership,
            "reconciling workspace ownership",
            user::reconcile_ownership(
                cancel,
                &self.containers,
                &outcome.container,
                user.as_deref(),
                &workspace_folder,
            ),
        )
        .await?;

        self.phase(BootPhase::GitAccess, "configuring git access", async {
            git_access::install_credential_helper(
                cancel,
                &self.config,
                &self.containers,
                &outcome.container,
                &creds.callback_token,
            )
            .await?;
            git_access::configure_git_identity(
                cancel,
                &self.containers,
                &outcome.container,
                creds.git_user_name.as_deref(),
                creds.git_user_email.as_deref(),
            )
            .await
        })
        .await?;

        self.phase(BootPhase::Environment, "injecting workspace environment", async {
            // Platform metadata is best-effort; a workspace without shell
            // conveniences still beats no workspace.
            if let Err(error) = environment::inject_platform_env(
                cancel,
                &self.config,
                &self.containers,
                &outcome.container,
                creds.github_token.as_deref(),
            )
            .await
            {
                tracing::warn!(%error, "platform environment injection failed");
            }
            if let Some(provision) = provision {
                environment::inject_project_env(
                    cancel,
                    &self.containers,
                    &outcome.container,
                    &provision.project_env_vars,
                )
                .await?;
                environment::write_project_files(
                    cancel,
                    &self.config,
                    &self.containers,
                    &outcome.container,
                    user.as_deref(),
                    &provision.project_files,
                )
                .await?;
            }
            Ok::<_, EnvironmentError>(())
        })
        .await?;

        let in_recovery = outcome.fallback || had_marker;
        self.phase(
            BootPhase::Ready,
            "reporting workspace ready",
            readiness::report_ready(
                cancel,
                &self.config,
                &self.control_plane,
                &creds.callback_token,
                in_recovery,
            ),
        )
        .await?;

        tracing::info!(workspace = %self.config.workspace_id, "workspace bootstrap complete");
        Ok(())
    }

    /// Run one phase, mirroring start/success/failure to the boot reporter.
    async fn phase<T, E>(
        &self,
        phase: BootPhase,
        action: &str,
        work: impl Future<Output = Result<T, E>>,
    ) -> Result<T, BootstrapError>
    where
        E: Into<BootstrapError> + std::fmt::Display,
    {
        self.reporter.log(phase, PhaseStatus::Started, action, None);
        match work.await {
            Ok(value) => {
                self.reporter.log(phase, PhaseStatus::Succeeded, action, None);
                Ok(value)
            }
            Err(error) => {
                let message = error.to_string();
                self.reporter.log(phase, PhaseStatus::Failed, &message, None);
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
