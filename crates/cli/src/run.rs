// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level bridge runner — shared by `main` and the smoke tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dispatch::{Dispatcher, ToolContext};
use crate::ledger::ProcessLedger;
use crate::lifecycle::{self, Lifecycle};
use crate::reload::ReloadController;
use crate::rpc;
use crate::snapshot::SnapshotEngine;

/// Run the bridge until the agent hangs up or a signal arrives.
/// Returns the process exit code.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    init_tracing(&config);

    let lifecycle = Arc::new(Lifecycle::new(config.clone()));
    let reload = Arc::new(ReloadController::new(config.bridge_root.clone()));
    let ctx = Arc::new(ToolContext {
        config: config.clone(),
        lifecycle: Arc::clone(&lifecycle),
        engine: Arc::new(SnapshotEngine::new()),
        ledger: Arc::new(ProcessLedger::new()),
        reload,
    });
    let dispatcher = Arc::new(Dispatcher::new(ctx));

    install_panic_teardown(&lifecycle);
    spawn_signal_handler(&lifecycle);

    info!(workspace = %config.workspace_root().display(), "drover bridge ready");
    rpc::serve(dispatcher, config.tool_timeout_duration()).await?;

    // Stdin EOF: the agent hung up. Detach without killing the window so
    // the next bridge reconnects to it.
    lifecycle.mark_shutting_down();
    lifecycle.graceful_detach();
    Ok(0)
}

/// Initialize tracing to stderr; stdout belongs to the agent protocol.
///
/// Uses `try_init` so it is safe to call repeatedly from tests.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / DROVER_LOG_LEVEL > RUST_LOG > "info".
    let filter = if std::env::var("DROVER_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let result = match config.log_format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    drop(result);
}

/// A panic anywhere tears the editor down synchronously and exits 1.
fn install_panic_teardown(lifecycle: &Arc<Lifecycle>) {
    let state = lifecycle.teardown_state();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        lifecycle::teardown_blocking(&state);
        previous(info);
        std::process::exit(1);
    }));
}

/// SIGINT/SIGTERM detach gracefully (window survives) and exit 0. Both
/// handlers share a single-shot guard with the stdin-EOF path.
fn spawn_signal_handler(lifecycle: &Arc<Lifecycle>) {
    static FIRED: AtomicBool = AtomicBool::new(false);
    let lifecycle = Arc::clone(lifecycle);

    tokio::spawn(async move {
        wait_for_signal().await;
        if FIRED.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("termination signal received, detaching");
        lifecycle.mark_shutting_down();
        lifecycle.graceful_detach();
        std::process::exit(0);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    let mut sigint =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();
    tokio::select! {
        _ = async {
            if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
        } => {}
        _ = async {
            if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
        } => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
