//! # ota-core: Foundational Types for the OTA Stack
//!
//! This crate defines the type-system primitives shared by every other crate
//! in the workspace. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `AppId` and `VersionName` have
//!    validated constructors. Both end up as path components in the public
//!    distribution tree, so an unvalidated string never reaches the filesystem.
//!
//! 2. **`FileDigest` is always 64 lowercase hex chars.** Construction goes
//!    through `sha256_*` helpers or `FileDigest::parse()`; there is no way to
//!    hold a malformed digest.
//!
//! 3. **Manifests are frozen values.** A `Manifest` is computed once when a
//!    version is first uploaded and is only ever compared against afterwards.
//!    [`Manifest::delta_from()`] is the single definition of "which files does
//!    an older version need".
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ota-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod manifest;

pub use digest::{sha256_bytes, sha256_file, sha256_reader, FileDigest};
pub use error::{ManifestError, ValidationError};
pub use identity::{AppId, VersionName};
pub use manifest::Manifest;
