// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires [`lumen_core`] to axum: the HTTP/WebSocket/SSE/long-poll surface,
//! per-connection session runtime, pub/sub fan-out, and process
//! configuration. Grounded in the teacher's `coop_mux::run`
//! (`crates/mux/src/lib.rs`): build shared state, spawn the background
//! sweeps, assemble the router, bind, serve with graceful shutdown.

pub mod buffer_pool;
pub mod component;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod error;
pub mod pubsub;
pub mod rate_limit;
pub mod recovery;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::state::AppState;

/// Run the server to completion: binds, serves, and drains on shutdown.
/// Returns once the listener has stopped accepting and in-flight sessions
/// have either finished or been force-cancelled at the graceful-shutdown
/// deadline.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let session_cleanup_interval = config.session_cleanup_interval();
    let graceful_shutdown_deadline = config.graceful_shutdown_deadline();

    let state = Arc::new(AppState::new(config));
    let shutdown = state.shutdown.clone();

    session::manager::spawn_ttl_sweep(
        state.manager.clone(),
        session_cleanup_interval,
        shutdown.clone(),
        |session| {
            session.mark_timeout_evicted();
            session.cancel.cancel();
        },
    );
    spawn_recovery_sweep(state.clone(), session_cleanup_interval, shutdown.clone());

    let app = router::build_router(state.clone());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "lumen-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    let _ = tokio::time::timeout(graceful_shutdown_deadline, drain(state)).await;
    Ok(())
}

/// Resolves once either an OS interrupt arrives or the state's own shutdown
/// token is cancelled by something else (a test harness, a future admin
/// endpoint). Either path cancels the token, so every session sees the same
/// signal regardless of why the server is stopping.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining");
        }
        _ = shutdown.clone().cancelled() => {}
    }
    shutdown.cancel();
}

async fn drain(state: Arc<AppState>) {
    state.pubsub.close().await;
}

fn spawn_recovery_sweep(state: Arc<AppState>, interval: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            state.recovery.sweep_expired().await;
        }
    });
}
