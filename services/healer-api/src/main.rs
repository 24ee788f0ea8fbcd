//! Self-healing credential and replay service
//!
//! Single-binary service that:
//! 1. Seeds the credential pool from configuration
//! 2. Hands out and rotates credentials over HTTP
//! 3. Accepts failed requests and replays them with backoff
//! 4. Exposes pool/queue health and Prometheus metrics

mod config;
mod error;
mod metrics;
mod mock;
mod rotation;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credential_pool::CredentialPool;
use retry_queue::{HttpTransport, RetryQueue, spawn_queue_worker};

use crate::config::Config;
use crate::routes::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting healer-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        credentials = config.credentials.len(),
        poll_interval_secs = config.queue.poll_interval_secs,
        "configuration loaded"
    );

    let pool = Arc::new(CredentialPool::new());
    let seeds = config
        .credentials
        .iter()
        .cloned()
        .map(config::CredentialSeed::into_credential)
        .collect::<error::Result<Vec<_>>>()?;
    pool.register_all(seeds).await;

    let queue_config = config.queue.to_queue_config();
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(
        config.queue.replay_timeout_secs,
    )));
    let queue = Arc::new(RetryQueue::new(queue_config.clone(), transport));

    let worker = if queue_config.worker_enabled {
        info!(
            interval_secs = queue_config.poll_interval.as_secs(),
            "queue worker started"
        );
        Some(spawn_queue_worker(queue.clone(), queue_config.poll_interval))
    } else {
        info!("queue worker disabled");
        None
    };

    let app_state = AppState {
        pool,
        queue,
        prometheus: prometheus_handle,
        default_provider: config.server.default_provider.clone(),
        default_model: config.server.default_model.clone(),
    };
    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Cancel the worker cooperatively and await its exit; the cancelled join
    // error is the expected outcome
    if let Some(worker) = worker {
        worker.abort();
        if let Err(e) = worker.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "queue worker exited abnormally");
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
