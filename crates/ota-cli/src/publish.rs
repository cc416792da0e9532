//! # Publish Subcommand
//!
//! `ota publish --app <id> --version <name> <bundle.zip>` runs the full
//! publish pipeline against the local directories and prints the report.
//! The per-application lock is process-local, so do not publish from the
//! command line for an application the running server may be publishing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use ota_core::{AppId, VersionName};
use ota_dist::{Distributor, PublishRequest};

use crate::DirOverrides;

/// Arguments for `ota publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Application identifier.
    #[arg(long)]
    pub app: String,

    /// Version name to publish.
    #[arg(long)]
    pub version: String,

    /// Bundle archive produced by `ota pack`.
    pub bundle: PathBuf,

    /// Maximum wait for the publish lock, in milliseconds.
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

/// Execute `ota publish`.
pub fn run_publish(args: &PublishArgs, dirs: &DirOverrides) -> Result<u8> {
    let app = AppId::new(args.app.as_str())?;
    let version = VersionName::new(args.version.as_str())?;
    let archive = std::fs::read(&args.bundle)
        .with_context(|| format!("reading {}", args.bundle.display()))?;

    let mut config = dirs.resolve()?;
    if let Some(ms) = args.wait_ms {
        config.lock_wait = Duration::from_millis(ms);
    }
    let dist = Distributor::open(config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let report = runtime.block_on(async {
        let permit = dist.acquire(&app).await?;
        dist.publish(permit, PublishRequest { version, archive }).await
    })?;

    if !report.changed {
        tracing::info!(version = %report.version, "version is already latest with identical content");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}
