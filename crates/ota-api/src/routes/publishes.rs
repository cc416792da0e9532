//! # Publish Task API
//!
//! `GET /v1/publishes/{task_id}` reports the state of an asynchronous
//! publish. Tasks are only visible to the application that created them;
//! another application's task id answers 404 like an unknown one.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::PublisherApp;
use crate::state::AppState;
use crate::tasks::PublishTask;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/publishes/{task_id}", get(get_publish))
}

async fn get_publish(
    State(state): State<AppState>,
    PublisherApp(app_id): PublisherApp,
    Path(task_id): Path<Uuid>,
) -> Result<Json<PublishTask>, AppError> {
    state
        .tasks
        .get(&app_id, task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("publish task {task_id}")))
}
