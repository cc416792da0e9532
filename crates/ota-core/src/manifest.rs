//! # Frozen File Manifests
//!
//! A `Manifest` maps every file of one version's content (by `/`-separated
//! path relative to the content root) to its [`FileDigest`].
//!
//! ## Lifecycle
//!
//! The manifest of a version is computed exactly once, when the version is
//! first uploaded, and persisted next to its artifact as `checksum.json`.
//! Every later publish reads that persisted copy back and compares it against
//! the new latest manifest; it is never recomputed from an artifact, because
//! a version's artifact is rewritten into a delta as soon as a newer version
//! ships.
//!
//! ## On-disk Format
//!
//! A flat JSON object `{ "<relative path>": "<64 hex>" }`. Keys are kept in a
//! `BTreeMap`, so serialization is deterministic.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::digest::FileDigest;
use crate::error::ManifestError;

/// Mapping from relative file path to content digest for one version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, FileDigest>);

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the digest of the file at `path`.
    ///
    /// `path` must be relative, `/`-separated, and free of `.`/`..`
    /// components. Returns the digest previously recorded for the path.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        digest: FileDigest,
    ) -> Result<Option<FileDigest>, ManifestError> {
        let path = path.into();
        validate_entry_path(&path)?;
        Ok(self.0.insert(path, digest))
    }

    /// Digest recorded for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&FileDigest> {
        self.0.get(path)
    }

    /// Whether `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Number of files recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no files are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileDigest)> {
        self.0.iter().map(|(p, d)| (p.as_str(), d))
    }

    /// Paths an installation at `older` needs to reach `self`.
    ///
    /// Returns, in path order, every path of `self` that is absent from
    /// `older` or whose digest differs. Paths present only in `older` are not
    /// reported: deltas carry additions and changes, never removals.
    pub fn delta_from(&self, older: &Manifest) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(path, digest)| older.0.get(path.as_str()) != Some(*digest))
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Parse a manifest from its `checksum.json` bytes.
    ///
    /// Every key is re-validated, so a tampered manifest cannot smuggle a
    /// traversal path into the delta builder.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let raw: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
        let mut manifest = Manifest::new();
        for (path, hex) in raw {
            let digest = FileDigest::parse(&hex).map_err(|reason| ManifestError::InvalidDigest {
                path: path.clone(),
                reason,
            })?;
            manifest.insert(path, digest)?;
        }
        Ok(manifest)
    }

    /// Serialize to the `checksum.json` representation.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Read a manifest file from disk.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a FileDigest);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FileDigest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Reject anything that is not a plain `a/b/c` relative path.
fn validate_entry_path(path: &str) -> Result<(), ManifestError> {
    let invalid = || ManifestError::InvalidPath {
        path: path.to_string(),
    };
    if path.is_empty() || path.contains('\\') || path.split('/').any(|seg| seg.is_empty()) {
        return Err(invalid());
    }
    if !Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(())
}
