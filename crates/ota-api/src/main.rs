//! # ota-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the OTA distribution service.
//! Binds to a configurable port (default 3000). On start the public tree is
//! reconciled with the pointer store before any request is served.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use ota_api::registry::{AppRegistry, InMemoryRegistry};
use ota_api::state::{AppConfig, AppState, LogFormat};
use ota_dist::Distributor;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let registry: Arc<dyn AppRegistry> = match &config.registry_file {
        Some(path) => {
            let registry = InMemoryRegistry::load(path).map_err(|e| {
                tracing::error!("Registry load failed: {e}");
                e
            })?;
            tracing::info!(apps = registry.len(), path = %path.display(), "registry loaded");
            Arc::new(registry)
        }
        None => {
            tracing::warn!("OTA_REGISTRY_FILE not set; every credential will be rejected");
            Arc::new(InMemoryRegistry::new())
        }
    };

    let dist = Distributor::open(config.dist.clone()).map_err(|e| {
        tracing::error!("Distribution directories unavailable: {e}");
        e
    })?;

    let report = dist.reconcile().map_err(|e| {
        tracing::error!("Startup reconciliation failed: {e}");
        e
    })?;
    if !report.is_clean() {
        tracing::warn!(
            restored = report.restored.len(),
            repointed = report.repointed.len(),
            discarded = report.discarded,
            skipped = report.skipped.len(),
            "repaired state left by an interrupted publish"
        );
    }

    let port = config.port;
    let metrics_enabled = config.metrics_enabled;
    let mut state = AppState::new(config, dist, registry);
    if metrics_enabled {
        let handle = PrometheusBuilder::new().install_recorder()?;
        state = state.with_metrics(handle);
    }

    let app = ota_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("OTA API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
