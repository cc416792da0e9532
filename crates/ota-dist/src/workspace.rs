//! # Workspaces
//!
//! A `Workspace` is the scratch directory exclusively owned by one in-flight
//! operation: the raw upload, the extracted content, the staged tree, and the
//! backup of the public tree all live inside it.
//!
//! Each workspace gets a unique name under the configured work root, so
//! concurrent uploads (including two uploads for the same application) never
//! collide. The directory is removed when the `Workspace` is dropped, on
//! every exit path: success, error return, panic unwinding, or the owning
//! future being dropped.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{DistError, IoResultExt};

/// Uniquely named scratch directory, deleted on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a new workspace under `root`, named `{label}-{random}`.
    pub fn create(root: &Path, label: &str) -> Result<Self, DistError> {
        fs::create_dir_all(root).at("creating work root", root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(root)
            .at("creating workspace in", root)?;
        let path = dir.path().to_path_buf();
        tracing::debug!(workspace = %path.display(), "workspace created");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Root of the workspace.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a subdirectory of the workspace.
    pub fn subdir(&self, name: &str) -> Result<PathBuf, DistError> {
        let dir = self.path.join(name);
        fs::create_dir_all(&dir).at("creating", &dir)?;
        Ok(dir)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!(workspace = %self.path.display(), "workspace removed"),
                Err(e) => tracing::warn!(
                    workspace = %self.path.display(),
                    error = %e,
                    "failed to remove workspace"
                ),
            }
        }
    }
}
