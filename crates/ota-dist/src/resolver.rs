//! # Update Resolver
//!
//! Answers "is there an update for a client at version X, and where is it?"
//!
//! Resolution never fails. A missing or unreadable pointer means no update,
//! and a client version without its own artifact gets the full bundle of the
//! latest version.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ota_core::{AppId, VersionName};

use crate::layout::{PublicTree, BUNDLE_FILE};
use crate::lock::AppLocks;
use crate::pointer::PointerStore;

/// Result of an update check. Serializes to `{}` when there is no update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    /// URL of the artifact the client should download.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub asset_bundle: Option<String>,
}

impl UpdateCheck {
    /// No update available.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether an update was found.
    pub fn has_update(&self) -> bool {
        self.asset_bundle.is_some()
    }
}

/// Resolves update checks against the live trees and pointer store.
#[derive(Debug, Clone)]
pub struct UpdateResolver {
    tree: PublicTree,
    pointers: Arc<dyn PointerStore>,
    locks: AppLocks,
    public_url_path: String,
}

impl UpdateResolver {
    pub fn new(
        tree: PublicTree,
        pointers: Arc<dyn PointerStore>,
        locks: AppLocks,
        public_url_path: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            pointers,
            locks,
            public_url_path: public_url_path.into(),
        }
    }

    /// Resolve the artifact URL for a client of `app` at `client_version`.
    ///
    /// `url_prefix` is the scheme and authority (optionally with a base
    /// path) that artifact paths are appended to.
    pub fn resolve(&self, app: &AppId, client_version: &str, url_prefix: &str) -> UpdateCheck {
        self.locks.read_tree(app, || {
            let latest = match self.pointers.get(app) {
                Ok(Some(latest)) => latest,
                Ok(None) => return UpdateCheck::none(),
                Err(e) => {
                    tracing::warn!(app_id = %app, error = %e, "pointer store unreadable; reporting no update");
                    return UpdateCheck::none();
                }
            };
            if latest == client_version {
                return UpdateCheck::none();
            }

            let served = VersionName::new(client_version)
                .ok()
                .filter(|v| self.tree.has_version(app, v))
                .unwrap_or(latest);
            UpdateCheck {
                asset_bundle: Some(self.artifact_url(url_prefix, app, &served)),
            }
        })
    }

    fn artifact_url(&self, url_prefix: &str, app: &AppId, version: &VersionName) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            url_prefix.trim_end_matches('/'),
            self.public_url_path,
            app,
            version,
            BUNDLE_FILE
        )
    }
}
