//! # Version API
//!
//! Publishing new versions and answering client update checks.
//!
//! ## Publish
//!
//! `POST /v1/versions` takes a multipart body with a `versionName` text
//! field and a `bundle` file field holding the zip archive. The version name
//! and bundle are validated before the per-application publish lock is
//! requested, so a malformed request never waits on, or blocks, a publish.
//!
//! By default the pipeline runs in the background: the response is
//! `202 Accepted` with a [`PublishTask`] whose state is polled at
//! `/v1/publishes/{id}`. With `?wait=true` the request runs the pipeline
//! and answers `200 OK` with the [`PublishReport`].
//!
//! ## Update check
//!
//! `GET /v1/versions/update?version=<client version>` answers
//! `{"assetBundle": "<url>"}` when the client should download something and
//! `{}` when it is current.

use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use ota_core::VersionName;
use ota_dist::{PublishReport, PublishRequest, UpdateCheck};

use crate::error::AppError;
use crate::extractors::{ConsumerApp, PublisherApp};
use crate::middleware::metrics::{publish_outcome, record_publish, record_update_check};
use crate::state::AppState;
use crate::tasks::PublishTask;

const VERSION_FIELD: &str = "versionName";
const BUNDLE_FIELD: &str = "bundle";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/versions",
            post(publish_version).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/versions/update", get(check_update))
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishOptions {
    /// Run the pipeline within the request.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuery {
    pub version: Option<String>,
}

/// Pull the version name and bundle out of the multipart body.
async fn read_upload(multipart: &mut Multipart) -> Result<PublishRequest, AppError> {
    let mut version = None;
    let mut archive = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(VERSION_FIELD) => version = Some(field.text().await?),
            Some(BUNDLE_FIELD) => archive = Some(field.bytes().await?.to_vec()),
            _ => {}
        }
    }

    let version = version
        .ok_or_else(|| AppError::Validation(format!("missing {VERSION_FIELD} field")))?;
    let version = VersionName::new(version.trim())?;
    let archive = archive
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::Validation(format!("missing or empty {BUNDLE_FIELD} field")))?;
    Ok(PublishRequest { version, archive })
}

async fn publish_version(
    State(state): State<AppState>,
    PublisherApp(app_id): PublisherApp,
    Query(options): Query<PublishOptions>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let request = match read_upload(&mut multipart).await {
        Ok(request) => request,
        Err(err) => {
            record_publish("invalid", None);
            return Err(err);
        }
    };

    let permit = match state.dist.acquire(&app_id).await {
        Ok(permit) => permit,
        Err(err) => {
            record_publish("busy", None);
            return Err(err.into());
        }
    };

    if options.wait {
        let started = Instant::now();
        let outcome = state.dist.publish(permit, request).await;
        record_publish(publish_outcome(&outcome), Some(started.elapsed()));
        let report: PublishReport = outcome?;
        return Ok((StatusCode::OK, Json(report)).into_response());
    }

    let task = state.tasks.create(app_id, request.version.clone());
    let task_id = task.id;
    let tasks = state.tasks.clone();
    let dist = state.dist.clone();
    tokio::spawn(async move {
        tasks.mark_running(task_id);
        let started = Instant::now();
        let outcome = dist.publish(permit, request).await;
        record_publish(publish_outcome(&outcome), Some(started.elapsed()));
        if let Err(err) = &outcome {
            tracing::warn!(task_id = %task_id, error = %err, "background publish failed");
        }
        tasks.complete(task_id, &outcome);
    });

    let location = format!("/v1/publishes/{task_id}");
    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location)],
        Json::<PublishTask>(task),
    )
        .into_response())
}

/// URL prefix for artifact links: the configured base URL, else the
/// request's `Host`. With neither, links are root-relative.
fn url_prefix(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.base_url {
        return base.clone();
    }
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

async fn check_update(
    State(state): State<AppState>,
    ConsumerApp(app_id): ConsumerApp,
    headers: HeaderMap,
    Query(query): Query<UpdateQuery>,
) -> Result<Json<UpdateCheck>, AppError> {
    let client_version = query
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation("missing version query parameter".into()))?;

    let prefix = url_prefix(&state, &headers);
    let check = state.dist.resolve(&app_id, client_version.trim(), &prefix);
    record_update_check(check.has_update());
    tracing::debug!(
        app_id = %app_id,
        client_version = %client_version,
        update = check.has_update(),
        "update check"
    );
    Ok(Json(check))
}
