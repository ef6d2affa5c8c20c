//! Cache restore boundary.
//!
//! Restoring is best effort: a miss means a cold build and a store failure
//! only disables caching for this run. Neither ever fails the setup step.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::keys::CacheKeySet;
use crate::store::ArtifactStore;

/// What a restore attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// An entry was unpacked into the cache directory.
    Hit {
        /// Key of the restored entry
        matched_key: String,
        /// Whether it matched the save key rather than a fallback key
        exact: bool,
    },
    /// No entry matched any key.
    Miss,
    /// The store could not be used; the build proceeds with a cold cache.
    Unavailable {
        /// Why the store failed
        reason: String,
    },
}

impl RestoreOutcome {
    /// Whether anything was restored.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// Key of the restored entry, if any.
    #[must_use]
    pub fn matched_key(&self) -> Option<&str> {
        match self {
            Self::Hit { matched_key, .. } => Some(matched_key),
            Self::Miss | Self::Unavailable { .. } => None,
        }
    }
}

/// Restores the object cache directory from an [`ArtifactStore`].
pub struct CacheRestorer<'a> {
    store: &'a dyn ArtifactStore,
}

impl<'a> CacheRestorer<'a> {
    /// Restore through `store`.
    #[must_use]
    pub fn new(store: &'a dyn ArtifactStore) -> Self {
        Self { store }
    }

    /// Restore `cache_dir` using `keys`. Never fails.
    pub async fn restore(&self, keys: &CacheKeySet, cache_dir: &Path) -> RestoreOutcome {
        let lookup = keys.lookup_order();
        let paths = [PathBuf::from(cache_dir)];
        debug!(
            store = self.store.name(),
            cache_dir = %cache_dir.display(),
            keys = ?lookup,
            "restoring cache"
        );

        match self.store.restore(&paths, &lookup).await {
            Ok(Some(matched_key)) => {
                let exact = keys.is_exact(&matched_key);
                info!(key = %matched_key, exact, "restored from cache key");
                RestoreOutcome::Hit { matched_key, exact }
            }
            Ok(None) => {
                let fallback = keys
                    .restore_keys()
                    .first()
                    .map_or(keys.save_key(), String::as_str);
                warn!(
                    "no cache for key {} or {} - cold cache or invalid key",
                    keys.save_key(),
                    fallback
                );
                RestoreOutcome::Miss
            }
            Err(e) => {
                error!(store = self.store.name(), error = %e, "caching not working");
                RestoreOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}
