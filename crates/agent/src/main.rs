// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! berthd: workspace bootstrap agent.
//!
//! Runs once at VM boot: resolves configuration from the environment,
//! executes the bootstrap pipeline, and exits. Ctrl-C (or SIGTERM via the
//! init system forwarding it as Ctrl-C) cancels the in-flight phase
//! promptly.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use berth_adapters::reporter::LogReporter;
use berth_adapters::subprocess::SystemRunner;
use berth_agent::bootstrap::Bootstrap;
use berth_agent::env;

#[tokio::main]
async fn main() -> ExitCode {
    let log_dir = env::state_dir().join("logs");
    let _guard = init_tracing(&log_dir);

    let config = match env::agent_config() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling bootstrap");
            signal_cancel.cancel();
        }
    });

    let bootstrap = match Bootstrap::new(config, Arc::new(SystemRunner), Arc::new(LogReporter)) {
        Ok(bootstrap) => bootstrap,
        Err(error) => {
            tracing::error!(%error, "failed to initialize agent");
            return ExitCode::FAILURE;
        }
    };

    match bootstrap.run_boot(&cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "workspace bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr and a daily-rolled file under the state directory.
fn init_tracing(log_dir: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::fs::create_dir_all(log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(log_dir, "berthd.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        None
    }
}
