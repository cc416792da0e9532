//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor, and the server configuration it is built from.
//!
//! ## Configuration
//!
//! Server settings come from `OTA_*` environment variables on top of the
//! pipeline's own [`DistConfig`]:
//!
//! | Variable | Default |
//! |---|---|
//! | `OTA_PORT` | `3000` |
//! | `OTA_BASE_URL` | unset (derived from the `Host` header) |
//! | `OTA_REGISTRY_FILE` | unset |
//! | `OTA_METRICS_ENABLED` | `true` |
//! | `OTA_LOG_FORMAT` | `text` |
//! | `OTA_MAX_UPLOAD_BYTES` | `268435456` |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use ota_dist::{ConfigError, DistConfig, Distributor};

use crate::registry::AppRegistry;
use crate::tasks::PublishTasks;

/// Default upload limit: 256 MiB.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Log output format for the server binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Fixed prefix for artifact URLs. When `None`, the request's `Host`
    /// header is used.
    pub base_url: Option<String>,
    /// YAML registry of applications and credential hashes.
    pub registry_file: Option<PathBuf>,
    /// Mount `/metrics` and install the Prometheus recorder.
    pub metrics_enabled: bool,
    pub log_format: LogFormat,
    /// Request body limit for bundle uploads.
    pub max_upload_bytes: usize,
    pub dist: DistConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            base_url: None,
            registry_file: None,
            metrics_enabled: true,
            log_format: LogFormat::Text,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            dist: DistConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self {
            dist: DistConfig::from_lookup(&lookup)?,
            ..Self::default()
        };
        if let Some(port) = lookup("OTA_PORT") {
            config.port = parse_var("OTA_PORT", &port)?;
        }
        if let Some(url) = lookup("OTA_BASE_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.base_url = Some(url.to_string());
            }
        }
        if let Some(path) = lookup("OTA_REGISTRY_FILE") {
            if !path.trim().is_empty() {
                config.registry_file = Some(PathBuf::from(path));
            }
        }
        if let Some(flag) = lookup("OTA_METRICS_ENABLED") {
            config.metrics_enabled = parse_var("OTA_METRICS_ENABLED", &flag)?;
        }
        if let Some(format) = lookup("OTA_LOG_FORMAT") {
            config.log_format = format.parse().map_err(|reason| ConfigError {
                var: "OTA_LOG_FORMAT",
                reason,
            })?;
        }
        if let Some(bytes) = lookup("OTA_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_var("OTA_MAX_UPLOAD_BYTES", &bytes)?;
        }
        Ok(config)
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        reason: e.to_string(),
    })
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dist: Distributor,
    pub registry: Arc<dyn AppRegistry>,
    pub tasks: PublishTasks,
    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("dist", &self.dist)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: AppConfig, dist: Distributor, registry: Arc<dyn AppRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            dist,
            registry,
            tasks: PublishTasks::new(),
            metrics: None,
        }
    }

    /// Attach the scrape handle served at `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
