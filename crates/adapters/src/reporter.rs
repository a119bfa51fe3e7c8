// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-log reporter seam.
//!
//! The structured boot log that streams progress to the control plane UI is
//! an external collaborator; the pipeline only ever talks to this trait.
//! Every implementation must be safe to call before a callback token exists
//! (events are simply dropped or buffered downstream).

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    Credentials,
    Volume,
    Repository,
    Build,
    Ownership,
    GitAccess,
    Environment,
    Ready,
}

impl BootPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootPhase::Credentials => "credentials",
            BootPhase::Volume => "volume",
            BootPhase::Repository => "repository",
            BootPhase::Build => "build",
            BootPhase::Ownership => "ownership",
            BootPhase::GitAccess => "git-access",
            BootPhase::Environment => "environment",
            BootPhase::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Started,
    Succeeded,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Started => "started",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
        }
    }
}

/// Sink for human-readable bootstrap progress events.
pub trait BootReporter: Send + Sync {
    fn log(&self, phase: BootPhase, status: PhaseStatus, message: &str, detail: Option<&str>);

    /// Hand the reporter the callback token once redemption succeeds, so it
    /// can authenticate its own stream to the control plane.
    fn set_token(&self, token: &str);
}

/// Drops every event.
pub struct NullReporter;

impl BootReporter for NullReporter {
    fn log(&self, _: BootPhase, _: PhaseStatus, _: &str, _: Option<&str>) {}
    fn set_token(&self, _: &str) {}
}

/// Forwards events to the process log.
pub struct LogReporter;

impl BootReporter for LogReporter {
    fn log(&self, phase: BootPhase, status: PhaseStatus, message: &str, detail: Option<&str>) {
        match status {
            PhaseStatus::Failed => tracing::error!(
                phase = phase.as_str(),
                detail = detail.unwrap_or(""),
                "{message}"
            ),
            _ => tracing::info!(
                phase = phase.as_str(),
                status = status.as_str(),
                detail = detail.unwrap_or(""),
                "{message}"
            ),
        }
    }

    fn set_token(&self, _: &str) {}
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingReporter;

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Captures events for assertions.
    #[derive(Default)]
    pub struct RecordingReporter {
        events: Mutex<Vec<(BootPhase, PhaseStatus, String)>>,
        tokens: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<(BootPhase, PhaseStatus, String)> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn tokens(&self) -> Vec<String> {
            self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn failures(&self) -> Vec<(BootPhase, String)> {
            self.events()
                .into_iter()
                .filter(|(_, status, _)| *status == PhaseStatus::Failed)
                .map(|(phase, _, message)| (phase, message))
                .collect()
        }
    }

    impl BootReporter for RecordingReporter {
        fn log(&self, phase: BootPhase, status: PhaseStatus, message: &str, _: Option<&str>) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((phase, status, message.to_string()));
        }

        fn set_token(&self, token: &str) {
            self.tokens.lock().unwrap_or_else(|e| e.into_inner()).push(token.to_string());
        }
    }
}
