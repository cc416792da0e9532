//! # Crash Reconciliation
//!
//! Repairs state a crashed process can leave behind, for every application
//! found under the public root:
//!
//! - a live tree missing because the process died between the two swap
//!   renames is restored from its `retired-*` directory;
//! - leftover `incoming-*` and `retired-*` directories are deleted;
//! - a pointer that disagrees with the live tree's `.latest` marker (crash
//!   between swap and commit) is advanced to the marker.
//!
//! Applications whose publish lock is currently held are skipped.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

use ota_core::{AppId, VersionName};

use crate::error::{DistError, IoResultExt};
use crate::fsutil::remove_dir_if_exists;
use crate::layout::PublicTree;
use crate::lock::AppLocks;
use crate::pointer::PointerStore;

/// A pointer moved to match its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repointed {
    pub app_id: AppId,
    pub from: Option<VersionName>,
    pub to: VersionName,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Applications whose live tree was restored from a retired tree.
    pub restored: Vec<AppId>,
    /// Pointers advanced to the tree marker.
    pub repointed: Vec<Repointed>,
    /// Number of leftover swap directories removed.
    pub discarded: usize,
    /// Applications skipped because a publish was in flight.
    pub skipped: Vec<AppId>,
}

impl ReconcileReport {
    /// Whether the pass changed nothing.
    pub fn is_clean(&self) -> bool {
        self.restored.is_empty() && self.repointed.is_empty() && self.discarded == 0
    }
}

/// Reconcile every application under `tree`.
pub fn reconcile(
    tree: &PublicTree,
    pointers: &dyn PointerStore,
    locks: &AppLocks,
) -> Result<ReconcileReport, DistError> {
    let mut report = ReconcileReport::default();
    for app in tree.apps()? {
        let _permit = match locks.try_acquire(&app) {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(app_id = %app, "publish in flight; skipping reconciliation");
                report.skipped.push(app);
                continue;
            }
        };
        reconcile_app(tree, pointers, &app, &mut report)?;
    }
    if report.is_clean() {
        tracing::debug!("reconciliation found nothing to repair");
    } else {
        tracing::info!(
            restored = report.restored.len(),
            repointed = report.repointed.len(),
            discarded = report.discarded,
            "reconciliation repaired state"
        );
    }
    Ok(report)
}

fn reconcile_app(
    tree: &PublicTree,
    pointers: &dyn PointerStore,
    app: &AppId,
    report: &mut ReconcileReport,
) -> Result<(), DistError> {
    let live = tree.app_dir(app);
    let swap_dir = tree.swap_dir(app);
    let (incoming, mut retired) = leftovers(&swap_dir)?;

    if !live.exists() {
        retired.sort_by_key(|(_, modified)| *modified);
        if let Some((newest, _)) = retired.pop() {
            fs::rename(&newest, &live).at("restoring", &newest)?;
            tracing::warn!(app_id = %app, from = %newest.display(), "restored retired tree");
            report.restored.push(app.clone());
        }
    }
    for dir in incoming.iter().chain(retired.iter().map(|(dir, _)| dir)) {
        remove_dir_if_exists(dir).at("removing", dir)?;
        report.discarded += 1;
    }
    match fs::remove_dir(&swap_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(dir = %swap_dir.display(), error = %e, "swap directory kept"),
    }

    let Some(marker) = tree.read_marker(app)? else {
        return Ok(());
    };
    let current = pointers.get(app)?;
    if current.as_ref() != Some(&marker) && tree.has_version(app, &marker) {
        pointers.set(app, &marker)?;
        tracing::warn!(
            app_id = %app,
            from = ?current.as_ref().map(VersionName::as_str),
            to = %marker,
            "pointer re-aligned with live tree"
        );
        report.repointed.push(Repointed {
            app_id: app.clone(),
            from: current,
            to: marker,
        });
    }
    Ok(())
}

type Leftovers = (Vec<PathBuf>, Vec<(PathBuf, SystemTime)>);

fn leftovers(swap_dir: &std::path::Path) -> Result<Leftovers, DistError> {
    let mut incoming = Vec::new();
    let mut retired = Vec::new();
    let entries = match fs::read_dir(swap_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((incoming, retired)),
        Err(e) => return Err(DistError::io("listing", swap_dir, e)),
    };
    for entry in entries {
        let entry = entry.at("listing", swap_dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("incoming-") {
            incoming.push(entry.path());
        } else if name.starts_with("retired-") {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            retired.push((entry.path(), modified));
        }
    }
    Ok((incoming, retired))
}
