//! Harvest Backend Service
//!
//! Standalone HTTP service exposing the crop, fertilizer, crop planning,
//! news and price endpoints. Configuration comes from `harvest.json` plus `HARVEST_*`
//! environment overrides.

use std::sync::Arc;

use anyhow::Context;
use harvest_lib::interfaces::http::{router, AppState};
use harvest_lib::settings::Settings;
use tracing::info;

async fn run_service() -> anyhow::Result<()> {
    harvest_lib::init_tracing();

    info!("Starting Harvest Service v{}", env!("CARGO_PKG_VERSION"));

    let handles = tokio::task::spawn_blocking(|| {
        let settings = Settings::load()?;
        harvest_lib::build_environment(settings)
    })
    .await
    .context("initialization task panicked")?
    .context("failed to initialize application")?;

    info!(dir = %handles.model_dir.display(), "model directory");

    let addr = handles.settings.bind_addr;
    let app = router(AppState::new(
        Arc::clone(&handles.predictions),
        Arc::clone(&handles.feeds),
        Arc::clone(&handles.planner),
    ));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Harvest Service listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("Harvest Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_service().await {
        eprintln!("[harvest::service] Service failed: {err:?}");
        std::process::exit(1);
    }
}
