//! # Distribution Builder
//!
//! Produces the complete next state of an application's distribution tree
//! in scratch space:
//!
//! 1. the new version's frozen manifest and full `bundle.zip`;
//! 2. for every previously published version, its untouched frozen manifest
//!    (copied byte for byte) and a delta `bundle.zip` holding only the files
//!    that are new or changed relative to that manifest, taken from the new
//!    content;
//! 3. the `.latest` marker naming the new version.
//!
//! Old manifests are always read back from the live tree, never recomputed:
//! once a version becomes a delta its archive no longer holds its own full
//! content.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use ota_core::{AppId, Manifest, VersionName};

use crate::archive::ArchiveCodec;
use crate::error::{DistError, IoResultExt};
use crate::layout::{PublishedVersion, BUNDLE_FILE, LATEST_MARKER, MANIFEST_FILE};

/// Files shipped in one version's delta artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    /// The historical version the delta upgrades from.
    pub version: VersionName,
    /// Number of files in its delta archive.
    pub files: usize,
}

/// A fully built distribution tree waiting to be swapped in.
#[derive(Debug)]
pub struct StagedTree {
    root: PathBuf,
    version: VersionName,
    full_files: usize,
    deltas: Vec<DeltaSummary>,
}

impl StagedTree {
    pub(crate) fn new(
        root: PathBuf,
        version: VersionName,
        full_files: usize,
        deltas: Vec<DeltaSummary>,
    ) -> Self {
        Self {
            root,
            version,
            full_files,
            deltas,
        }
    }

    /// Root of the staged tree (becomes `{public}/{app}`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The version holding the full artifact.
    pub fn version(&self) -> &VersionName {
        &self.version
    }

    /// Number of files in the full artifact.
    pub fn full_files(&self) -> usize {
        self.full_files
    }

    /// Per-version delta sizes.
    pub fn deltas(&self) -> &[DeltaSummary] {
        &self.deltas
    }
}

/// Inputs for one build.
#[derive(Debug)]
pub struct BuildInput<'a> {
    pub app_id: &'a AppId,
    pub version: &'a VersionName,
    /// Extracted content of the new version.
    pub content_dir: &'a Path,
    /// Manifest of `content_dir`, frozen by this build.
    pub manifest: &'a Manifest,
    /// Versions currently in the live tree.
    pub published: &'a [PublishedVersion],
}

/// Builds staged distribution trees.
#[derive(Debug, Clone)]
pub struct DistributionBuilder {
    codec: Arc<dyn ArchiveCodec>,
}

impl DistributionBuilder {
    pub fn new(codec: Arc<dyn ArchiveCodec>) -> Self {
        Self { codec }
    }

    /// Build the next tree under `staging_root/tree`.
    ///
    /// Any failure aborts the build; the caller's workspace owns whatever
    /// was partially written.
    pub fn build(&self, input: BuildInput<'_>, staging_root: &Path) -> Result<StagedTree, DistError> {
        let tree = staging_root.join("tree");
        let full_dir = tree.join(input.version.as_str());
        fs::create_dir_all(&full_dir).at("creating", &full_dir)?;

        let manifest_path = full_dir.join(MANIFEST_FILE);
        let manifest_bytes = input
            .manifest
            .to_json_vec()
            .map_err(|e| DistError::manifest("encoding", &manifest_path, e))?;
        fs::write(&manifest_path, manifest_bytes).at("writing", &manifest_path)?;

        let full_bundle = full_dir.join(BUNDLE_FILE);
        let full_files = self
            .codec
            .compress(input.content_dir, &full_bundle)
            .map_err(|e| DistError::archive("packing", &full_bundle, e))?;
        tracing::debug!(
            app_id = %input.app_id,
            version = %input.version,
            files = full_files,
            "full artifact staged"
        );

        let mut deltas = Vec::with_capacity(input.published.len());
        for old in input.published {
            if &old.name == input.version {
                continue;
            }
            deltas.push(self.stage_delta(&input, old, &tree)?);
        }

        let marker = tree.join(LATEST_MARKER);
        fs::write(&marker, input.version.as_str()).at("writing", &marker)?;

        Ok(StagedTree::new(tree, input.version.clone(), full_files, deltas))
    }

    fn stage_delta(
        &self,
        input: &BuildInput<'_>,
        old: &PublishedVersion,
        tree: &Path,
    ) -> Result<DeltaSummary, DistError> {
        let old_manifest = old.load_manifest()?;
        let changed = input.manifest.delta_from(&old_manifest);

        let dir = tree.join(old.name.as_str());
        fs::create_dir_all(&dir).at("creating", &dir)?;
        let source = old.manifest_path();
        let target = dir.join(MANIFEST_FILE);
        fs::copy(&source, &target).at("copying frozen manifest to", &target)?;

        let bundle = dir.join(BUNDLE_FILE);
        let files = self
            .codec
            .compress_files(input.content_dir, &changed, &bundle)
            .map_err(|e| DistError::archive("packing", &bundle, e))?;
        tracing::debug!(
            app_id = %input.app_id,
            from = %old.name,
            to = %input.version,
            files,
            "delta artifact staged"
        );
        Ok(DeltaSummary {
            version: old.name.clone(),
            files,
        })
    }
}
