//! # ota-dist: Version Publish and Delta Distribution
//!
//! The core of the OTA stack. Ingests uploaded bundles, freezes each
//! version's file manifest, rebuilds every older version's artifact as a
//! forward delta toward the new latest version, and swaps the public tree
//! atomically with rollback.
//!
//! ## Components
//!
//! | Module | Role |
//! |---|---|
//! | [`archive`] | `ArchiveCodec` trait, zip implementation |
//! | [`checksum`] | per-file SHA-256 manifest of a directory |
//! | [`builder`] | staged tree: full artifact plus deltas |
//! | [`coordinator`] | backup, swap, commit, rollback |
//! | [`pointer`] | latest-version pointer store |
//! | [`resolver`] | update checks |
//! | [`lock`] | per-application publish and tree locks |
//! | [`workspace`] | per-operation scratch directories |
//! | [`reconcile`] | crash repair |
//! | [`distributor`] | facade tying the above together |
//!
//! ## On-disk Layout
//!
//! ```text
//! {public}/{app}/{version}/checksum.json
//! {public}/{app}/{version}/bundle.zip
//! {public}/{app}/.latest
//! {data}/app_config.json
//! {work}/publish-*/            one per in-flight upload
//! ```
//!
//! ## Crate Policy
//!
//! - Depends only on `ota-core` internally.
//! - Synchronous filesystem code; async only at the lock and task boundary.
//! - No `.unwrap()` outside tests.

pub mod archive;
pub mod builder;
pub mod checksum;
pub mod config;
pub mod coordinator;
pub mod distributor;
pub mod error;
pub mod fsutil;
pub mod layout;
pub mod lock;
pub mod pointer;
pub mod reconcile;
pub mod resolver;
pub mod workspace;

pub use archive::{ArchiveCodec, ArchiveError, ZipCodec};
pub use builder::{DeltaSummary, DistributionBuilder, StagedTree};
pub use checksum::compute_manifest;
pub use config::{ConfigError, DistConfig};
pub use coordinator::{PublishCoordinator, PublishPhase};
pub use distributor::{Distributor, PublishReport, PublishRequest};
pub use error::DistError;
pub use layout::PublicTree;
pub use lock::{AppLocks, PublishPermit};
pub use pointer::{JsonPointerStore, PointerStore};
pub use reconcile::ReconcileReport;
pub use resolver::{UpdateCheck, UpdateResolver};
pub use workspace::Workspace;
