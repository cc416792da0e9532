//! # Prometheus Metrics
//!
//! Request and pipeline metrics recorded through the `metrics` facade. The
//! server binary installs a `metrics-exporter-prometheus` recorder and
//! serves its handle at `/metrics`; without a recorder every call here is a
//! no-op.
//!
//! | Metric | Labels |
//! |---|---|
//! | `ota_http_requests_total` | `method`, `path`, `status` |
//! | `ota_http_request_duration_seconds` | `method`, `path` |
//! | `ota_publishes_total` | `outcome` |
//! | `ota_publish_duration_seconds` | none |
//! | `ota_update_checks_total` | `result` |

use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

use ota_dist::{DistError, PublishReport};

/// Middleware recording a request counter and a latency histogram, labelled
/// by route template rather than raw path.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_owned();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "ota_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "ota_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

/// Label for a finished publish.
pub fn publish_outcome(outcome: &Result<PublishReport, DistError>) -> &'static str {
    match outcome {
        Ok(report) if report.changed => "published",
        Ok(_) => "unchanged",
        Err(DistError::Validation(_)) => "invalid",
        Err(DistError::Archive(_)) => "invalid_archive",
        Err(DistError::VersionConflict { .. }) => "conflict",
        Err(DistError::Busy { .. }) => "busy",
        Err(_) => "failed",
    }
}

/// Count a publish attempt; `elapsed` is recorded only for attempts that
/// ran the pipeline.
pub fn record_publish(outcome: &'static str, elapsed: Option<Duration>) {
    metrics::counter!("ota_publishes_total", "outcome" => outcome).increment(1);
    if let Some(elapsed) = elapsed {
        metrics::histogram!("ota_publish_duration_seconds").record(elapsed.as_secs_f64());
    }
}

pub fn record_update_check(has_update: bool) {
    let result = if has_update { "update" } else { "none" };
    metrics::counter!("ota_update_checks_total", "result" => result).increment(1);
}
