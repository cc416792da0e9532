//! # Per-application Locks
//!
//! Two locks per application, created lazily and never shared across
//! applications:
//!
//! - **Publish lock** (`tokio::sync::Mutex`): held for the whole
//!   build-then-publish sequence. Its owned guard travels inside a
//!   [`PublishPermit`], so the permit can cross into a blocking task.
//!   Waiters give up after the configured bound with [`DistError::Busy`].
//! - **Tree lock** (`parking_lot::RwLock`): readers hold it while resolving
//!   an update; the coordinator takes it for writing only across the swap
//!   renames and the pointer commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;

use ota_core::AppId;

use crate::error::DistError;

#[derive(Debug, Default)]
struct AppSlot {
    publish: Arc<tokio::sync::Mutex<()>>,
    tree: RwLock<()>,
}

/// Registry of per-application locks.
#[derive(Debug, Clone)]
pub struct AppLocks {
    slots: Arc<Mutex<HashMap<AppId, Arc<AppSlot>>>>,
    wait: Duration,
}

impl AppLocks {
    /// Create an empty registry whose publish lock waits at most `wait`.
    pub fn new(wait: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            wait,
        }
    }

    fn slot(&self, app: &AppId) -> Arc<AppSlot> {
        let mut slots = self.slots.lock();
        slots.entry(app.clone()).or_default().clone()
    }

    /// Acquire the publish lock, waiting at most the configured bound.
    pub async fn acquire(&self, app: &AppId) -> Result<PublishPermit, DistError> {
        let slot = self.slot(app);
        let guard = tokio::time::timeout(self.wait, slot.publish.clone().lock_owned())
            .await
            .map_err(|_| DistError::Busy {
                app_id: app.clone(),
            })?;
        tracing::debug!(app_id = %app, "publish lock acquired");
        Ok(PublishPermit {
            app_id: app.clone(),
            slot,
            _guard: guard,
        })
    }

    /// Acquire the publish lock without waiting.
    pub fn try_acquire(&self, app: &AppId) -> Result<PublishPermit, DistError> {
        let slot = self.slot(app);
        let guard = slot
            .publish
            .clone()
            .try_lock_owned()
            .map_err(|_| DistError::Busy {
                app_id: app.clone(),
            })?;
        Ok(PublishPermit {
            app_id: app.clone(),
            slot,
            _guard: guard,
        })
    }

    /// Run `f` while holding the application's tree read lock.
    pub fn read_tree<T>(&self, app: &AppId, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(app);
        let _guard: RwLockReadGuard<'_, ()> = slot.tree.read();
        f()
    }
}

/// Exclusive right to build and publish one application.
///
/// Dropping the permit releases the publish lock.
#[derive(Debug)]
pub struct PublishPermit {
    app_id: AppId,
    slot: Arc<AppSlot>,
    _guard: OwnedMutexGuard<()>,
}

impl PublishPermit {
    /// The application this permit covers.
    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    /// Block readers of this application's tree.
    pub(crate) fn lock_tree(&self) -> RwLockWriteGuard<'_, ()> {
        self.slot.tree.write()
    }
}
