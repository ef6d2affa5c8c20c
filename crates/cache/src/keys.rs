//! Cache key model.
//!
//! Every run saves under a unique key (`<prefix><timestamp>`) and restores
//! from the newest entry sharing the prefix. The prefix is `buildcache-`, or
//! `buildcache-<cache_key>-` when the step is given a `cache_key` input.

use chrono::{DateTime, SecondsFormat, Utc};

/// Prefix shared by every key this tool produces.
pub const KEY_BASE: &str = "buildcache-";

/// Ordered keys for one restore attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeySet {
    save_key: String,
    restore_keys: Vec<String>,
}

impl CacheKeySet {
    /// Create a key set from explicit keys.
    ///
    /// `restore_keys` must be ordered from most to least specific.
    #[must_use]
    pub fn new(save_key: impl Into<String>, restore_keys: Vec<String>) -> Self {
        Self {
            save_key: save_key.into(),
            restore_keys,
        }
    }

    /// Keys for a run started at `now`, optionally scoped by the `cache_key` input.
    #[must_use]
    pub fn for_run(cache_key: Option<&str>, now: DateTime<Utc>) -> Self {
        let prefix = match cache_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(input) => format!("{KEY_BASE}{input}-"),
            None => KEY_BASE.to_string(),
        };
        let unique = format!(
            "{prefix}{}",
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        Self::new(unique, vec![prefix])
    }

    /// The specific key a later save should use.
    #[must_use]
    pub fn save_key(&self) -> &str {
        &self.save_key
    }

    /// Fallback keys, most specific first.
    #[must_use]
    pub fn restore_keys(&self) -> &[String] {
        &self.restore_keys
    }

    /// Keys in lookup order: the save key, then every restore key.
    /// Duplicates are dropped.
    #[must_use]
    pub fn lookup_order(&self) -> Vec<String> {
        let mut keys = vec![self.save_key.clone()];
        for key in &self.restore_keys {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Whether `matched` is the save key itself, i.e. the cache is fully warm.
    #[must_use]
    pub fn is_exact(&self, matched: &str) -> bool {
        matched == self.save_key
    }
}
