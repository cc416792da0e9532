//! # Publish Coordinator
//!
//! Replaces an application's live distribution tree with a staged tree and
//! advances the latest pointer, or leaves both exactly as they were.
//!
//! ## Phases
//!
//! ```text
//! Idle ─► BackedUp ─► Swapped ─► Committed
//!             │           │
//!             └───────────┴────► RolledBack
//! ```
//!
//! - **Backup**: the live tree is copied into the workspace. A failure here
//!   aborts before anything public is touched.
//! - **Swap**: the staged tree is copied next to the live tree under
//!   `{public}/.swap/{app}/incoming-*`. Then, holding the tree write lock,
//!   the live tree is renamed to `retired-*` and the incoming tree takes its
//!   place. Readers see the old tree or the new one, never a mix.
//! - **Commit**: still under the write lock, the pointer store is advanced.
//!   A commit failure rolls the swap back, so tree and pointer never
//!   disagree.
//! - **Rollback**: the retired tree is renamed back; if that is impossible
//!   the backup copy is restored instead.
//!
//! Leftover `incoming-*` and `retired-*` directories are removed on every
//! exit path. A crash between the renames and the commit is repaired by
//! [`crate::reconcile`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use ota_core::VersionName;

use crate::builder::StagedTree;
use crate::error::{DistError, IoResultExt};
use crate::fsutil::{copy_tree, remove_dir_if_exists};
use crate::layout::PublicTree;
use crate::lock::PublishPermit;
use crate::pointer::PointerStore;
use crate::workspace::Workspace;

/// Progress of one publish through the swap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    Idle,
    BackedUp,
    Swapped,
    Committed,
    RolledBack,
}

impl fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::BackedUp => "backed_up",
            Self::Swapped => "swapped",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Paths involved in one swap.
struct SwapPaths {
    live: PathBuf,
    incoming: PathBuf,
    retired: PathBuf,
    backup: Option<PathBuf>,
}

/// Swaps staged trees into the public root and commits the pointer.
#[derive(Debug, Clone)]
pub struct PublishCoordinator {
    tree: PublicTree,
    pointers: Arc<dyn PointerStore>,
}

impl PublishCoordinator {
    pub fn new(tree: PublicTree, pointers: Arc<dyn PointerStore>) -> Self {
        Self { tree, pointers }
    }

    /// Publish `staged` as the application's live tree.
    ///
    /// On success the live tree is `staged` and the pointer names
    /// `staged.version()`. On error the live tree is byte-identical to what
    /// it was before and the pointer is untouched, unless the error is
    /// [`DistError::RollbackFailed`].
    pub fn publish(
        &self,
        permit: &PublishPermit,
        staged: &StagedTree,
        workspace: &Workspace,
    ) -> Result<PublishPhase, DistError> {
        let app = permit.app_id();
        let live = self.tree.app_dir(app);
        let swap_dir = self.tree.swap_dir(app);
        let token = Uuid::new_v4().simple().to_string();
        tracing::debug!(app_id = %app, version = %staged.version(), phase = %PublishPhase::Idle, "publish phase");

        let backup = if live.exists() {
            let backup = workspace.path().join("backup");
            copy_tree(&live, &backup)?;
            Some(backup)
        } else {
            None
        };
        tracing::debug!(app_id = %app, phase = %PublishPhase::BackedUp, "publish phase");

        let paths = SwapPaths {
            live,
            incoming: swap_dir.join(format!("incoming-{token}")),
            retired: swap_dir.join(format!("retired-{token}")),
            backup,
        };

        let outcome = self.swap_and_commit(permit, staged.version(), staged.root(), &paths);
        self.cleanup(&paths);
        let phase = outcome?;
        tracing::info!(app_id = %app, version = %staged.version(), phase = %phase, "publish committed");
        Ok(phase)
    }

    fn swap_and_commit(
        &self,
        permit: &PublishPermit,
        version: &VersionName,
        staged_root: &Path,
        paths: &SwapPaths,
    ) -> Result<PublishPhase, DistError> {
        let app = permit.app_id();
        if let Some(parent) = paths.incoming.parent() {
            fs::create_dir_all(parent).at("creating", parent)?;
        }
        copy_tree(staged_root, &paths.incoming)?;

        let _tree = permit.lock_tree();
        let had_live = paths.live.exists();
        if had_live {
            fs::rename(&paths.live, &paths.retired).at("retiring", &paths.live)?;
        }
        if let Err(err) = fs::rename(&paths.incoming, &paths.live).at("swapping in", &paths.live) {
            return Err(self.roll_back(paths, had_live, err));
        }
        tracing::debug!(app_id = %app, phase = %PublishPhase::Swapped, "publish phase");

        if let Err(err) = self.pointers.set(app, version) {
            return Err(self.roll_back(paths, had_live, err));
        }
        Ok(PublishPhase::Committed)
    }

    /// Restore the pre-publish tree. Returns the error the caller should
    /// report: `cause` itself, or `RollbackFailed` wrapping it.
    fn roll_back(&self, paths: &SwapPaths, had_live: bool, cause: DistError) -> DistError {
        tracing::warn!(
            live = %paths.live.display(),
            error = %cause,
            "publish failed after swap began, rolling back"
        );
        match restore(paths, had_live) {
            Ok(()) => {
                tracing::info!(
                    live = %paths.live.display(),
                    phase = %PublishPhase::RolledBack,
                    "publish phase"
                );
                cause
            }
            Err(rollback) => {
                tracing::error!(
                    live = %paths.live.display(),
                    error = %rollback,
                    "rollback failed; run reconciliation"
                );
                DistError::RollbackFailed {
                    source: Box::new(cause),
                    rollback,
                }
            }
        }
    }

    fn cleanup(&self, paths: &SwapPaths) {
        for dir in [&paths.incoming, &paths.retired] {
            if let Err(e) = remove_dir_if_exists(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove swap leftovers");
            }
        }
    }
}

fn restore(paths: &SwapPaths, had_live: bool) -> Result<(), String> {
    if had_live && !paths.retired.exists() && paths.backup.is_none() {
        return Err("neither retired tree nor backup is available".to_string());
    }
    remove_dir_if_exists(&paths.live)
        .map_err(|e| format!("removing new tree {}: {e}", paths.live.display()))?;
    if !had_live {
        return Ok(());
    }
    if paths.retired.exists() {
        return fs::rename(&paths.retired, &paths.live)
            .map_err(|e| format!("renaming {} back: {e}", paths.retired.display()));
    }
    match &paths.backup {
        Some(backup) => copy_tree(backup, &paths.live)
            .map(|_| ())
            .map_err(|e| format!("restoring backup: {e}")),
        None => Ok(()),
    }
}
