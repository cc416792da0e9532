//! # Reconcile Subcommand
//!
//! `ota reconcile` repairs the public tree and pointer store after a crash.
//! The server does the same on start; this command is for operators who
//! need it without a restart.

use anyhow::Result;
use clap::Args;

use ota_dist::Distributor;

use crate::DirOverrides;

/// Arguments for `ota reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {}

/// Execute `ota reconcile`. Exit code 0 when nothing needed repair, 2 when
/// something was repaired.
pub fn run_reconcile(_args: &ReconcileArgs, dirs: &DirOverrides) -> Result<u8> {
    let dist = Distributor::open(dirs.resolve()?)?;
    let report = dist.reconcile()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    for app in &report.skipped {
        tracing::warn!(app_id = %app, "skipped: publish in progress");
    }
    Ok(if report.is_clean() { 0 } else { 2 })
}
