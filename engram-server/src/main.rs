//! Engram admin server entry point.
//!
//! Loads config, opens the engine, elects the background owner through
//! the web lock, and serves the admin API on localhost.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engram_core::config::EngramConfig;
use engram_engine::MemoryEngine;
use engram_server::{router, WebLock};

const DEFAULT_PORT: u16 = 7437;
const HOST: &str = "127.0.0.1";

/// Daily background cleanup interval for the elected owner.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngramConfig::load();
    let port = std::env::var("ENGRAM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let lock_path = config.web_lock_path();
    let engine = Arc::new(MemoryEngine::open(config).context("open memory engine")?);

    let mut lock = WebLock::acquire(&lock_path, HOST, port).context("acquire web lock")?;
    if lock.is_owner() {
        info!(port, "elected background owner");
        spawn_background_jobs(engine.clone());
    } else {
        info!(port, "joined existing web lock as non-owner");
    }

    let app = router(engine.clone());
    let listener = tokio::net::TcpListener::bind((HOST, port))
        .await
        .with_context(|| format!("bind {HOST}:{port}"))?;
    info!(addr = %listener.local_addr()?, "admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = lock.release() {
        warn!(error = %e, "web lock release failed");
    }
    engine.shutdown().context("engine shutdown")?;
    Ok(())
}

/// Periodic maintenance run only by the elected owner.
fn spawn_background_jobs(engine: Arc<MemoryEngine>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays fast.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.run_cleanup() {
                Ok(report) => info!(deleted = report.deleted, "scheduled cleanup complete"),
                Err(e) => warn!(error = %e, "scheduled cleanup failed"),
            }
            if let Err(e) = engine.checkpoint() {
                warn!(error = %e, "scheduled checkpoint failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed, shutting down");
    }
    info!("shutdown signal received");
}
