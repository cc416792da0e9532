//! # ota-api: Axum API Services for the OTA Stack
//!
//! HTTP front end of the bundle distribution pipeline in `ota-dist`.
//! Publishers upload new versions of an application's content; clients ask
//! whether they should download a full or delta bundle.
//!
//! ## API Surface
//!
//! | Route                          | Module                     | Credential        |
//! |--------------------------------|----------------------------|-------------------|
//! | `POST /v1/versions`            | [`routes::versions`]       | `x-publisher-key` |
//! | `GET /v1/versions/update`      | [`routes::versions`]       | `x-consumer-key`  |
//! | `GET /v1/publishes/{task_id}`  | [`routes::publishes`]      | `x-publisher-key` |
//! | `GET /health/*`, `GET /metrics`| this module                | none              |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → credential extractor → Handler
//! ```

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;
pub mod tasks;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/metrics` are mounted outside the metrics middleware
/// so scrapes do not count themselves.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::versions::router(state.config.max_upload_bytes))
        .merge(routes::publishes::router())
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    if state.metrics.is_some() {
        unauthenticated = unauthenticated.route("/metrics", get(prometheus_metrics));
    }

    Router::new()
        .merge(unauthenticated)
        .merge(api)
        .with_state(state)
}

/// Liveness probe: always 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the public and work directories are present.
async fn readiness(State(state): State<AppState>) -> Response {
    if !state.dist.tree().root().is_dir() {
        return (StatusCode::SERVICE_UNAVAILABLE, "public directory missing").into_response();
    }
    if !state.dist.config().work_dir.is_dir() {
        return (StatusCode::SERVICE_UNAVAILABLE, "work directory missing").into_response();
    }
    "ready".into_response()
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
