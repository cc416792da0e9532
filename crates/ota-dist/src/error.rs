//! # Distribution Pipeline Errors
//!
//! One error type for the whole publish pipeline. Variants follow the
//! failure taxonomy of the service:
//!
//! - `Validation`: rejected before any I/O or lock acquisition.
//! - `Archive`: the upload could not be decoded; nothing public was touched.
//! - `Io`: filesystem failure during build or swap (swap failures are rolled
//!   back before this is returned).
//! - `Busy`: another publish for the same application holds the lock.
//! - `VersionConflict`: an existing version name was re-uploaded with
//!   different content.
//! - `RollbackFailed`: a swap failed *and* the public tree could not be
//!   restored; operators must run reconciliation.
//!
//! Errors always carry the application and path context needed to act on
//! them from a log line alone.

use std::io;
use std::path::Path;

use thiserror::Error;

use ota_core::{AppId, ManifestError, ValidationError, VersionName};

use crate::archive::ArchiveError;

/// Errors from the distribution pipeline.
#[derive(Error, Debug)]
pub enum DistError {
    /// Request input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The uploaded archive is corrupt, unsafe, or empty.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A frozen manifest could not be read or written.
    #[error("manifest error ({context}): {source}")]
    Manifest {
        /// What the pipeline was doing.
        context: String,
        /// Underlying manifest error.
        #[source]
        source: ManifestError,
    },

    /// Filesystem failure.
    #[error("io error while {context}: {source}")]
    Io {
        /// What the pipeline was doing, including the path involved.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Another publish for this application is in flight.
    #[error("a publish for app {app_id} is already in progress")]
    Busy {
        /// The contended application.
        app_id: AppId,
    },

    /// The version already exists with a different manifest.
    #[error("version {version} of app {app_id} already exists with different content")]
    VersionConflict {
        /// The application.
        app_id: AppId,
        /// The version name that was re-uploaded.
        version: VersionName,
    },

    /// The latest-pointer store failed.
    #[error("pointer store error: {0}")]
    PointerStore(String),

    /// A swap failed and restoring the previous tree also failed.
    #[error("publish failed ({source}) and rollback failed: {rollback}")]
    RollbackFailed {
        /// The error that triggered the rollback.
        #[source]
        source: Box<DistError>,
        /// Why the rollback could not complete.
        rollback: String,
    },

    /// The blocking publish task panicked or was cancelled.
    #[error("publish task aborted: {0}")]
    TaskAborted(String),
}

impl DistError {
    /// Build an `Io` error for an operation on `path`.
    pub fn io(action: &str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context: format!("{action} {}", path.display()),
            source,
        }
    }

    /// Classify an archive failure: local filesystem errors become `Io`,
    /// problems with the archive itself stay `Archive`.
    pub fn archive(action: &str, path: &Path, source: ArchiveError) -> Self {
        match source {
            ArchiveError::Io(e) => Self::io(action, path, e),
            other => Self::Archive(other),
        }
    }

    /// Build a `Manifest` error for an operation on `path`.
    pub fn manifest(action: &str, path: &Path, source: ManifestError) -> Self {
        Self::Manifest {
            context: format!("{action} {}", path.display()),
            source,
        }
    }
}

impl From<ValidationError> for DistError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Attach path context to an `io::Result`.
pub(crate) trait IoResultExt<T> {
    fn at(self, action: &str, path: &Path) -> Result<T, DistError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, action: &str, path: &Path) -> Result<T, DistError> {
        self.map_err(|e| DistError::io(action, path, e))
    }
}
