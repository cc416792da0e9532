//! # Latest Pointer Store
//!
//! Durable mapping from application to the version clients should converge
//! toward. Only a successful publish (or crash reconciliation) writes it.
//!
//! [`JsonPointerStore`] keeps every application in one file,
//! `{data}/app_config.json`:
//!
//! ```json
//! { "test-ota": { "appId": "test-ota", "latestVersion": "v2" } }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ota_core::{AppId, VersionName};

use crate::error::DistError;
use crate::fsutil::write_atomic;

/// File name of the JSON pointer store inside the data directory.
pub const POINTER_FILE: &str = "app_config.json";

/// Storage for latest-version pointers.
pub trait PointerStore: Send + Sync + fmt::Debug {
    /// The latest version of `app`, if one was ever published.
    fn get(&self, app: &AppId) -> Result<Option<VersionName>, DistError>;

    /// Advance the pointer of `app` to `version`.
    fn set(&self, app: &AppId, version: &VersionName) -> Result<(), DistError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppPointer {
    app_id: AppId,
    latest_version: VersionName,
}

/// Pointer store backed by a single JSON file, replaced atomically.
#[derive(Debug)]
pub struct JsonPointerStore {
    path: PathBuf,
    file_lock: Mutex<()>,
}

impl JsonPointerStore {
    /// Store at `{data_dir}/app_config.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(POINTER_FILE))
    }

    /// Store at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_lock: Mutex::new(()),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, AppPointer>, DistError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(DistError::PointerStore(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            DistError::PointerStore(format!("parsing {}: {e}", self.path.display()))
        })
    }
}

impl PointerStore for JsonPointerStore {
    fn get(&self, app: &AppId) -> Result<Option<VersionName>, DistError> {
        let _guard = self.file_lock.lock();
        Ok(self
            .read_all()?
            .remove(app.as_str())
            .map(|entry| entry.latest_version))
    }

    fn set(&self, app: &AppId, version: &VersionName) -> Result<(), DistError> {
        let _guard = self.file_lock.lock();
        let mut all = self.read_all()?;
        all.insert(
            app.to_string(),
            AppPointer {
                app_id: app.clone(),
                latest_version: version.clone(),
            },
        );
        let bytes = serde_json::to_vec_pretty(&all)
            .map_err(|e| DistError::PointerStore(format!("encoding pointers: {e}")))?;
        write_atomic(&self.path, &bytes)?;
        tracing::debug!(app_id = %app, version = %version, "latest pointer written");
        Ok(())
    }
}
