//! # Pipeline Configuration
//!
//! Directory roots and the publish-lock wait bound, read from `OTA_*`
//! environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `OTA_PUBLIC_DIR` | `public` |
//! | `OTA_DATA_DIR` | `data` |
//! | `OTA_WORK_DIR` | `temp` |
//! | `OTA_LOCK_WAIT_MS` | `5000` |
//! | `OTA_PUBLIC_URL_PATH` | `public` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// A configuration variable held an unusable value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    /// The environment variable name.
    pub var: &'static str,
    /// What was wrong with it.
    pub reason: String,
}

/// Filesystem layout and timing for the distribution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistConfig {
    /// Root of the public distribution trees.
    pub public_dir: PathBuf,
    /// Directory holding the pointer store.
    pub data_dir: PathBuf,
    /// Root under which workspaces are created.
    pub work_dir: PathBuf,
    /// How long a publish waits for the per-application lock.
    pub lock_wait: Duration,
    /// URL segment under which `public_dir` is served.
    pub public_url_path: String,
}

impl Default for DistConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            data_dir: PathBuf::from("data"),
            work_dir: PathBuf::from("temp"),
            lock_wait: Duration::from_millis(5000),
            public_url_path: "public".to_string(),
        }
    }
}

impl DistConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("OTA_PUBLIC_DIR") {
            config.public_dir = non_empty_path("OTA_PUBLIC_DIR", dir)?;
        }
        if let Some(dir) = lookup("OTA_DATA_DIR") {
            config.data_dir = non_empty_path("OTA_DATA_DIR", dir)?;
        }
        if let Some(dir) = lookup("OTA_WORK_DIR") {
            config.work_dir = non_empty_path("OTA_WORK_DIR", dir)?;
        }
        if let Some(ms) = lookup("OTA_LOCK_WAIT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|e| ConfigError {
                var: "OTA_LOCK_WAIT_MS",
                reason: format!("{e}"),
            })?;
            config.lock_wait = Duration::from_millis(ms);
        }
        if let Some(segment) = lookup("OTA_PUBLIC_URL_PATH") {
            let segment = segment.trim_matches('/').to_string();
            if segment.is_empty() {
                return Err(ConfigError {
                    var: "OTA_PUBLIC_URL_PATH",
                    reason: "must not be empty".into(),
                });
            }
            config.public_url_path = segment;
        }
        Ok(config)
    }

    /// Default configuration with all three directories placed under `base`.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            public_dir: base.join("public"),
            data_dir: base.join("data"),
            work_dir: base.join("temp"),
            ..Self::default()
        }
    }
}

fn non_empty_path(var: &'static str, value: String) -> Result<PathBuf, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError {
            var,
            reason: "must not be empty".into(),
        });
    }
    Ok(PathBuf::from(value))
}
