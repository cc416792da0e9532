//! # Checksum Engine
//!
//! Computes the [`Manifest`] of a content directory: one SHA-256 digest per
//! regular file, keyed by `/`-separated path relative to the root.

use std::path::Path;

use ota_core::{sha256_file, Manifest};

use crate::error::{DistError, IoResultExt};
use crate::fsutil::walk_files;

/// Hash every regular file under `content_root`.
///
/// Directories are not entries. Symbolic links anywhere in the tree are an
/// error. Any read failure aborts the walk and no partial manifest is
/// returned.
pub fn compute_manifest(content_root: &Path) -> Result<Manifest, DistError> {
    let files = walk_files(content_root).at("walking", content_root)?;
    let mut manifest = Manifest::new();
    for rel in files {
        let path = content_root.join(&rel);
        let digest = sha256_file(&path).at("hashing", &path)?;
        manifest
            .insert(rel, digest)
            .map_err(|e| DistError::manifest("recording", &path, e))?;
    }
    tracing::debug!(
        root = %content_root.display(),
        files = manifest.len(),
        "manifest computed"
    );
    Ok(manifest)
}
