// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! berth-adapters: external I/O for the berth workspace agent.
//!
//! Everything the agent touches outside its own process goes through this
//! crate: the container engine CLI, the version-control CLI, the
//! devcontainer build CLI (all via one subprocess seam) and the control
//! plane HTTP API.

pub mod container;
pub mod control_plane;
pub mod devcontainer;
pub mod git;
pub mod reporter;
pub mod subprocess;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use container::{ContainerCli, ContainerError};
pub use control_plane::{ControlPlaneClient, ControlPlaneError, ReadyStatus, Redemption};
pub use devcontainer::{DevcontainerCli, DevcontainerError};
pub use git::{GitCli, GitError};
pub use reporter::{BootPhase, BootReporter, LogReporter, NullReporter, PhaseStatus};
pub use subprocess::{CommandOutput, CommandRunner, CommandSpec, SubprocessError, SystemRunner};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use reporter::RecordingReporter;
#[cfg(any(test, feature = "test-support"))]
pub use subprocess::ScriptedRunner;
