//! # ota-cli: OTA Stack Command-Line Interface
//!
//! Operator tooling for the bundle distribution pipeline. Commands work on
//! the same directories the `ota-api` server uses, so a version published
//! from the command line is immediately served to clients.
//!
//! ## Subcommands
//!
//! - `manifest`: print the checksum manifest of a content directory
//! - `pack`: zip a content directory into a publishable bundle
//! - `publish`: run the publish pipeline for one version
//! - `check`: resolve an update check as a client would
//! - `keys issue`: generate publisher and consumer credentials
//! - `reconcile`: repair state left by an interrupted publish
//!
//! ## Crate Policy
//!
//! - Argument parsing lives beside each handler; handlers delegate to
//!   `ota-dist` and `ota-api` and hold no pipeline logic of their own.
//! - Results go to stdout as JSON or YAML; diagnostics go to the log.

pub mod bundle;
pub mod check;
pub mod keys;
pub mod publish;
pub mod reconcile;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ota_dist::DistConfig;

/// Directory overrides shared by every subcommand. Unset flags fall back to
/// the `OTA_*` environment variables and then to the defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct DirOverrides {
    /// Public distribution root.
    #[arg(long, global = true)]
    pub public_dir: Option<PathBuf>,

    /// Directory holding the latest-version pointers.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Root for temporary workspaces.
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,
}

impl DirOverrides {
    /// Pipeline configuration from the environment with these overrides.
    pub fn resolve(&self) -> Result<DistConfig> {
        let config = DistConfig::from_env().context("reading OTA_* configuration")?;
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: DistConfig) -> DistConfig {
        if let Some(dir) = &self.public_dir {
            config.public_dir = dir.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        config
    }
}
