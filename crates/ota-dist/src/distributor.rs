//! # Distributor
//!
//! Facade owning one instance of every pipeline component. Front ends (the
//! HTTP service and the CLI) only talk to this type.
//!
//! ## Publishing
//!
//! ```text
//! acquire(app) ─► PublishPermit
//! publish(permit, request)
//!   ├─ validate request
//!   ├─ Workspace::create         unique scratch dir, removed on drop
//!   ├─ decompress upload         unsafe or clashing entries rejected
//!   ├─ compute_manifest          frozen for this version from now on
//!   ├─ version conflict check
//!   ├─ DistributionBuilder       full artifact + one delta per old version
//!   └─ PublishCoordinator        backup, swap, commit or roll back
//! ```
//!
//! `publish` runs the whole pipeline on the blocking thread pool. The permit
//! and the workspace move into that task, so a caller that stops waiting
//! never leaves a half-built tree or a leaked lock behind.

use std::fs;
use std::sync::Arc;

use serde::Serialize;

use ota_core::{AppId, ManifestError, VersionName};

use crate::archive::{ArchiveCodec, ArchiveError, ZipCodec};
use crate::builder::{BuildInput, DeltaSummary, DistributionBuilder};
use crate::checksum::compute_manifest;
use crate::config::DistConfig;
use crate::coordinator::PublishCoordinator;
use crate::error::{DistError, IoResultExt};
use crate::layout::{PublicTree, PublishedVersion};
use crate::lock::{AppLocks, PublishPermit};
use crate::pointer::{JsonPointerStore, PointerStore};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::resolver::{UpdateCheck, UpdateResolver};
use crate::workspace::Workspace;

/// A new version to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub version: VersionName,
    /// Raw `bundle.zip` bytes as uploaded.
    pub archive: Vec<u8>,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub app_id: AppId,
    pub version: VersionName,
    /// Latest version before this publish.
    pub previous_latest: Option<VersionName>,
    /// Files in the new full artifact.
    pub files: usize,
    /// Delta artifacts rebuilt for older versions.
    pub deltas: Vec<DeltaSummary>,
    /// False when the version was already latest with identical content and
    /// nothing was rebuilt.
    pub changed: bool,
}

#[derive(Debug)]
struct Inner {
    config: DistConfig,
    tree: PublicTree,
    pointers: Arc<dyn PointerStore>,
    codec: Arc<dyn ArchiveCodec>,
    locks: AppLocks,
    builder: DistributionBuilder,
    coordinator: PublishCoordinator,
    resolver: UpdateResolver,
}

/// The distribution pipeline.
#[derive(Debug, Clone)]
pub struct Distributor {
    inner: Arc<Inner>,
}

impl Distributor {
    /// Open the pipeline with the JSON pointer store and zip codec.
    ///
    /// Creates the public, data, and work directories when missing.
    pub fn open(config: DistConfig) -> Result<Self, DistError> {
        let pointers = Arc::new(JsonPointerStore::in_dir(&config.data_dir));
        Self::with_parts(config, pointers, Arc::new(ZipCodec))
    }

    /// Open the pipeline with explicit collaborators.
    pub fn with_parts(
        config: DistConfig,
        pointers: Arc<dyn PointerStore>,
        codec: Arc<dyn ArchiveCodec>,
    ) -> Result<Self, DistError> {
        for dir in [&config.public_dir, &config.data_dir, &config.work_dir] {
            fs::create_dir_all(dir).at("creating", dir)?;
        }
        let tree = PublicTree::new(&config.public_dir);
        let locks = AppLocks::new(config.lock_wait);
        let inner = Inner {
            builder: DistributionBuilder::new(codec.clone()),
            coordinator: PublishCoordinator::new(tree.clone(), pointers.clone()),
            resolver: UpdateResolver::new(
                tree.clone(),
                pointers.clone(),
                locks.clone(),
                config.public_url_path.clone(),
            ),
            config,
            tree,
            pointers,
            codec,
            locks,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &DistConfig {
        &self.inner.config
    }

    pub fn tree(&self) -> &PublicTree {
        &self.inner.tree
    }

    pub fn locks(&self) -> &AppLocks {
        &self.inner.locks
    }

    /// Wait (up to the configured bound) for the right to publish `app`.
    pub async fn acquire(&self, app: &AppId) -> Result<PublishPermit, DistError> {
        self.inner.locks.acquire(app).await
    }

    /// Take the right to publish `app` only if nobody holds it.
    pub fn try_acquire(&self, app: &AppId) -> Result<PublishPermit, DistError> {
        self.inner.locks.try_acquire(app)
    }

    /// Run the publish pipeline on the blocking pool.
    pub async fn publish(
        &self,
        permit: PublishPermit,
        request: PublishRequest,
    ) -> Result<PublishReport, DistError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.publish_blocking(&permit, request))
            .await
            .map_err(|e| DistError::TaskAborted(e.to_string()))?
    }

    /// Run the publish pipeline on the current thread.
    pub fn publish_blocking(
        &self,
        permit: &PublishPermit,
        request: PublishRequest,
    ) -> Result<PublishReport, DistError> {
        let app = permit.app_id();
        let version = &request.version;
        let span = tracing::info_span!("publish", app_id = %app, version = %version);
        let _enter = span.enter();

        if request.archive.is_empty() {
            return Err(DistError::Validation("bundle archive is empty".into()));
        }

        let workspace = Workspace::create(&self.inner.config.work_dir, "publish")?;
        let upload = workspace.path().join("upload.zip");
        fs::write(&upload, &request.archive).at("writing", &upload)?;

        let content = workspace.subdir("content")?;
        let extracted = self
            .inner
            .codec
            .decompress(&upload, &content)
            .map_err(|e| DistError::archive("extracting", &upload, e))?;
        let manifest = compute_manifest(&content).map_err(upload_manifest_error)?;
        if extracted == 0 || manifest.is_empty() {
            return Err(ArchiveError::Empty.into());
        }
        tracing::info!(files = manifest.len(), "upload extracted");

        let published = self.inner.tree.published_versions(app)?;
        let previous_latest = self.inner.pointers.get(app)?;
        if let Some(existing) = published.iter().find(|v| &v.name == version) {
            if existing.load_manifest()? != manifest {
                return Err(DistError::VersionConflict {
                    app_id: app.clone(),
                    version: version.clone(),
                });
            }
            if previous_latest.as_ref() == Some(version) {
                tracing::info!("version is already latest with identical content");
                return Ok(PublishReport {
                    app_id: app.clone(),
                    version: version.clone(),
                    previous_latest,
                    files: manifest.len(),
                    deltas: Vec::new(),
                    changed: false,
                });
            }
            tracing::info!(latest = ?previous_latest.as_ref().map(VersionName::as_str), "restoring older version as latest");
        }

        let staging = workspace.subdir("staging")?;
        let staged = self.inner.builder.build(
            BuildInput {
                app_id: app,
                version,
                content_dir: &content,
                manifest: &manifest,
                published: &published,
            },
            &staging,
        )?;
        self.inner.coordinator.publish(permit, &staged, &workspace)?;

        Ok(PublishReport {
            app_id: app.clone(),
            version: version.clone(),
            previous_latest,
            files: staged.full_files(),
            deltas: staged.deltas().to_vec(),
            changed: true,
        })
    }

    /// Resolve an update check. Never fails.
    pub fn resolve(&self, app: &AppId, client_version: &str, url_prefix: &str) -> UpdateCheck {
        self.inner.resolver.resolve(app, client_version, url_prefix)
    }

    /// Current latest version of `app`.
    pub fn latest(&self, app: &AppId) -> Result<Option<VersionName>, DistError> {
        self.inner.pointers.get(app)
    }

    /// Versions present in the live tree of `app`.
    pub fn published_versions(&self, app: &AppId) -> Result<Vec<PublishedVersion>, DistError> {
        self.inner.tree.published_versions(app)
    }

    /// Repair state left by a crashed process.
    pub fn reconcile(&self) -> Result<ReconcileReport, DistError> {
        reconcile(&self.inner.tree, self.inner.pointers.as_ref(), &self.inner.locks)
    }
}

/// A manifest failure on freshly extracted content is a fault of the upload.
fn upload_manifest_error(err: DistError) -> DistError {
    match err {
        DistError::Manifest {
            source: ManifestError::InvalidPath { path },
            ..
        } => ArchiveError::UnsafeEntry { path }.into(),
        DistError::Manifest { source, .. } => ArchiveError::Corrupt(source.to_string()).into(),
        other => other,
    }
}
