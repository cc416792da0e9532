//! # Publish Tasks
//!
//! An asynchronous publish is tracked as a [`PublishTask`] whose state the
//! publisher can poll:
//!
//! ```text
//! Queued ─► Running ─► Succeeded
//!                  └─► Failed
//! ```
//!
//! Finished tasks are kept in memory up to a fixed capacity; the oldest
//! finished tasks are evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ota_core::{AppId, VersionName};
use ota_dist::{DistError, PublishReport};

use crate::error::{AppError, ErrorDetail};

/// Finished tasks retained before eviction.
const MAX_RETAINED: usize = 1024;

/// Lifecycle state of a publish task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A tracked publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTask {
    pub id: Uuid,
    pub app_id: AppId,
    pub version: VersionName,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PublishReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Default)]
struct Table {
    tasks: HashMap<Uuid, PublishTask>,
    /// Task ids in creation order.
    order: VecDeque<Uuid>,
}

impl Table {
    fn evict_finished(&mut self) {
        let mut finished = self
            .tasks
            .values()
            .filter(|t| t.status.is_finished())
            .count();
        let tasks = &mut self.tasks;
        self.order.retain(|id| {
            if finished < MAX_RETAINED {
                return true;
            }
            match tasks.get(id) {
                Some(task) if task.status.is_finished() => {
                    tasks.remove(id);
                    finished -= 1;
                    false
                }
                Some(_) => true,
                None => false,
            }
        });
    }
}

/// In-memory task table shared by the handlers and the spawned publishes.
#[derive(Debug, Clone, Default)]
pub struct PublishTasks {
    table: Arc<RwLock<Table>>,
}

impl PublishTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new queued task.
    pub fn create(&self, app_id: AppId, version: VersionName) -> PublishTask {
        let now = Utc::now();
        let task = PublishTask {
            id: Uuid::new_v4(),
            app_id,
            version,
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
            report: None,
            error: None,
        };
        let mut table = self.table.write();
        table.evict_finished();
        table.order.push_back(task.id);
        table.tasks.insert(task.id, task.clone());
        task
    }

    pub fn mark_running(&self, id: Uuid) {
        self.update(id, |task| task.status = TaskStatus::Running);
    }

    /// Record the outcome of the pipeline.
    pub fn complete(&self, id: Uuid, outcome: &Result<PublishReport, DistError>) {
        self.update(id, |task| match outcome {
            Ok(report) => {
                task.status = TaskStatus::Succeeded;
                task.report = Some(report.clone());
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error = Some(AppError::from(err).detail());
            }
        });
    }

    /// Look up a task belonging to `app_id`.
    pub fn get(&self, app_id: &AppId, id: Uuid) -> Option<PublishTask> {
        self.table
            .read()
            .tasks
            .get(&id)
            .filter(|task| &task.app_id == app_id)
            .cloned()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut PublishTask)) {
        if let Some(task) = self.table.write().tasks.get_mut(&id) {
            f(task);
            task.updated_at = Utc::now();
        }
    }
}
