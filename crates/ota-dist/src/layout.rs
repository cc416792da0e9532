//! # Public Tree Layout
//!
//! Path arithmetic for the public distribution root:
//!
//! ```text
//! {public}/
//!   {app}/
//!     .latest                 version name the tree was built for
//!     {version}/checksum.json frozen manifest
//!     {version}/bundle.zip    full (latest) or delta artifact
//!   .swap/{app}/              incoming-* and retired-* trees during a swap
//! ```
//!
//! Everything here is pure path construction plus read-only listing; the
//! writers are the builder and the coordinator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ota_core::{AppId, Manifest, VersionName};

use crate::error::{DistError, IoResultExt};

/// File name of a version's frozen manifest.
pub const MANIFEST_FILE: &str = "checksum.json";
/// File name of a version's artifact archive.
pub const BUNDLE_FILE: &str = "bundle.zip";
/// Marker recording which version a tree holds the full artifact for.
pub const LATEST_MARKER: &str = ".latest";
/// Directory under the public root used for in-flight swaps.
pub const SWAP_DIR: &str = ".swap";

/// A version found in an application's live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVersion {
    /// The version name.
    pub name: VersionName,
    /// Directory holding the version's artifact.
    pub artifact_dir: PathBuf,
}

impl PublishedVersion {
    /// Path of the frozen manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.artifact_dir.join(MANIFEST_FILE)
    }

    /// Load the frozen manifest.
    pub fn load_manifest(&self) -> Result<Manifest, DistError> {
        let path = self.manifest_path();
        Manifest::load(&path).map_err(|e| DistError::manifest("loading", &path, e))
    }
}

/// The public distribution root.
#[derive(Debug, Clone)]
pub struct PublicTree {
    root: PathBuf,
}

impl PublicTree {
    /// Wrap a public root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The public root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{public}/{app}`
    pub fn app_dir(&self, app: &AppId) -> PathBuf {
        self.root.join(app.as_str())
    }

    /// `{public}/{app}/{version}`
    pub fn artifact_dir(&self, app: &AppId, version: &VersionName) -> PathBuf {
        self.app_dir(app).join(version.as_str())
    }

    /// `{public}/{app}/{version}/bundle.zip`
    pub fn bundle_path(&self, app: &AppId, version: &VersionName) -> PathBuf {
        self.artifact_dir(app, version).join(BUNDLE_FILE)
    }

    /// `{public}/{app}/{version}/checksum.json`
    pub fn manifest_path(&self, app: &AppId, version: &VersionName) -> PathBuf {
        self.artifact_dir(app, version).join(MANIFEST_FILE)
    }

    /// `{public}/.swap/{app}`
    pub fn swap_dir(&self, app: &AppId) -> PathBuf {
        self.root.join(SWAP_DIR).join(app.as_str())
    }

    /// Whether a version's artifact archive is present.
    pub fn has_version(&self, app: &AppId, version: &VersionName) -> bool {
        self.bundle_path(app, version).is_file()
    }

    /// Every version present in the application's live tree, sorted by name.
    ///
    /// A missing application directory yields an empty list. Hidden entries
    /// and directories whose name is not a valid version name are skipped.
    pub fn published_versions(&self, app: &AppId) -> Result<Vec<PublishedVersion>, DistError> {
        let dir = self.app_dir(app);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DistError::io("listing", &dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.at("listing", &dir)?;
            if !entry.file_type().at("inspecting", &entry.path())?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match VersionName::new(name) {
                Ok(name) => versions.push(PublishedVersion {
                    artifact_dir: entry.path(),
                    name,
                }),
                Err(e) => {
                    tracing::warn!(app_id = %app, dir = %entry.path().display(), error = %e, "skipping unrecognised directory");
                }
            }
        }
        versions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(versions)
    }

    /// Read the `.latest` marker of an application's live tree.
    pub fn read_marker(&self, app: &AppId) -> Result<Option<VersionName>, DistError> {
        read_marker_at(&self.app_dir(app))
    }

    /// Applications with a live tree or leftover swap state.
    pub fn apps(&self) -> Result<Vec<AppId>, DistError> {
        let mut apps = Vec::new();
        for dir in [self.root.clone(), self.root.join(SWAP_DIR)] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(DistError::io("listing", &dir, e)),
            };
            for entry in entries {
                let entry = entry.at("listing", &dir)?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Ok(app) = AppId::new(name) {
                    if !apps.contains(&app) {
                        apps.push(app);
                    }
                }
            }
        }
        apps.sort();
        Ok(apps)
    }
}

/// Read the `.latest` marker of the tree rooted at `tree_root`.
pub(crate) fn read_marker_at(tree_root: &Path) -> Result<Option<VersionName>, DistError> {
    let path = tree_root.join(LATEST_MARKER);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(Some(VersionName::new(text.trim())?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DistError::io("reading", &path, e)),
    }
}
