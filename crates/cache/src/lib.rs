//! Object cache restore for buildcache-setup
//!
//! Restores the buildcache object directory from an artifact store before the
//! build runs:
//! - Layered keys: a unique per-run key and a shared prefix fallback
//! - Stores: the GitHub Actions cache service (v1 and v2) or a local archive
//!   directory
//! - Best effort: misses and store failures are reported, never fatal

mod error;
pub mod actions;
pub mod archive;
pub mod keys;
pub mod local;
pub mod restore;
pub mod store;

pub use error::{Error, Result};

pub use actions::{ActionsCacheStore, CacheService};
pub use archive::{CompressionMethod, cache_version, detect_compression, unpack_archive};
pub use keys::{CacheKeySet, KEY_BASE};
pub use local::LocalStore;
pub use restore::{CacheRestorer, RestoreOutcome};
pub use store::{
    ArtifactStore, StoreConfig, UnavailableStore, build_store, select_entry, validate_key,
    validate_keys,
};
