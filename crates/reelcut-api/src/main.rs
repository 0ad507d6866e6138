//! Axum API server binary hosting the clip engine.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use reelcut_api::{create_router, metrics, ApiConfig, AppState};
use reelcut_media::FfmpegTool;
use reelcut_storage::LocalStorage;
use reelcut_worker::{init_tracing, ClipEngine, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("reelcut=info");

    info!("Starting reelcut-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, slots={}",
        config.host, config.port, worker_config.max_concurrent_jobs
    );

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                error!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let tool = Arc::new(FfmpegTool::new(
        worker_config.encoding.clone(),
        worker_config.timeout_policy(),
    ));
    let storage = Arc::new(LocalStorage::new(&config.output_dir));

    let engine = ClipEngine::start(worker_config, tool, storage.clone())
        .await
        .context("failed to start clip engine")?;

    let state = AppState::new(config.clone(), engine.dispatcher(), storage);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    // Stop accepting connections first, then drain the engine so open
    // status streams see their jobs settle before the server exits.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = stop_tx.send(());

    info!("Draining clip engine");
    engine.shutdown().await.context("engine shutdown failed")?;
    server
        .await
        .context("server task panicked")?
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
