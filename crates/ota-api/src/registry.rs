//! # Application Registry
//!
//! Resolves opaque credentials to the application they belong to. Publishers
//! and consumers hold different keys; a key only ever resolves in its own
//! role.
//!
//! Keys are never stored. [`InMemoryRegistry`] indexes applications by the
//! SHA-256 of each credential, so a registry file can be committed or shared
//! without exposing the keys themselves:
//!
//! ```yaml
//! apps:
//!   - id: test-ota
//!     publisher_key_sha256: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//!     consumer_key_sha256: 60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ota_core::{sha256_bytes, AppId, FileDigest};

/// Bytes of entropy in an issued key.
const KEY_BYTES: usize = 32;

/// Credential lookup used by the request extractors.
pub trait AppRegistry: Send + Sync + fmt::Debug {
    /// Application owning a publisher credential.
    fn resolve_publisher(&self, credential: &str) -> Option<AppId>;

    /// Application owning a consumer credential.
    fn resolve_consumer(&self, credential: &str) -> Option<AppId>;
}

/// Errors loading a registry file.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("reading registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing registry: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("key hash registered twice (app {app_id})")]
    DuplicateKey { app_id: AppId },
}

/// One application's entry in a registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: AppId,
    pub publisher_key_sha256: FileDigest,
    pub consumer_key_sha256: FileDigest,
}

/// On-disk registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub apps: Vec<RegistryEntry>,
}

/// Freshly generated credentials for one application.
#[derive(Clone)]
pub struct IssuedKeys {
    pub app_id: AppId,
    pub publisher_key: String,
    pub consumer_key: String,
}

impl fmt::Debug for IssuedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKeys")
            .field("app_id", &self.app_id)
            .field("publisher_key", &"[REDACTED]")
            .field("consumer_key", &"[REDACTED]")
            .finish()
    }
}

impl IssuedKeys {
    /// Generate a publisher and a consumer key for `app_id`.
    pub fn generate(app_id: AppId) -> Self {
        Self {
            app_id,
            publisher_key: random_key(),
            consumer_key: random_key(),
        }
    }

    /// The registry entry holding these keys' hashes.
    pub fn entry(&self) -> RegistryEntry {
        RegistryEntry {
            id: self.app_id.clone(),
            publisher_key_sha256: hash_credential(&self.publisher_key),
            consumer_key_sha256: hash_credential(&self.consumer_key),
        }
    }
}

/// Hex-encoded random key.
fn random_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest under which a credential is indexed.
pub fn hash_credential(credential: &str) -> FileDigest {
    sha256_bytes(credential.as_bytes())
}

#[derive(Debug, Default)]
struct Index {
    publishers: HashMap<FileDigest, AppId>,
    consumers: HashMap<FileDigest, AppId>,
}

/// Registry held in memory, keyed by credential hash.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    index: RwLock<Index>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from parsed file contents.
    pub fn from_file(file: RegistryFile) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for entry in file.apps {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Parse a YAML registry document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file)
    }

    /// Load a YAML registry file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Add an application. Key hashes must not already be registered.
    pub fn register(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let mut index = self.index.write();
        if index.publishers.contains_key(&entry.publisher_key_sha256)
            || index.consumers.contains_key(&entry.consumer_key_sha256)
            || entry.publisher_key_sha256 == entry.consumer_key_sha256
        {
            return Err(RegistryError::DuplicateKey { app_id: entry.id });
        }
        index
            .publishers
            .insert(entry.publisher_key_sha256, entry.id.clone());
        index.consumers.insert(entry.consumer_key_sha256, entry.id);
        Ok(())
    }

    /// Register freshly issued keys.
    pub fn register_keys(&self, keys: &IssuedKeys) -> Result<(), RegistryError> {
        self.register(keys.entry())
    }

    /// Number of registered applications.
    pub fn len(&self) -> usize {
        self.index.read().publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AppRegistry for InMemoryRegistry {
    fn resolve_publisher(&self, credential: &str) -> Option<AppId> {
        self.index
            .read()
            .publishers
            .get(&hash_credential(credential))
            .cloned()
    }

    fn resolve_consumer(&self, credential: &str) -> Option<AppId> {
        self.index
            .read()
            .consumers
            .get(&hash_credential(credential))
            .cloned()
    }
}
