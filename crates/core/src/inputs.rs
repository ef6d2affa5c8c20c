//! Step inputs.
//!
//! GitHub Actions passes `with:` values to a step as `INPUT_<NAME>`
//! environment variables, upper-cased with spaces replaced by underscores.

use std::path::PathBuf;

use crate::JobContext;

/// Directory name used for the object cache when `BUILDCACHE_DIR` is unset.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".buildcache";

/// User-facing inputs of the setup step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionInputs {
    /// Requested tool version; empty or `latest` triggers remote resolution.
    pub version: String,
    /// Optional component mixed into the cache keys.
    pub cache_key: Option<String>,
}

impl ActionInputs {
    /// Read inputs from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let cache_key = input("cache_key");
        Self {
            version: input("version"),
            cache_key: (!cache_key.is_empty()).then_some(cache_key),
        }
    }

    /// Directory the object cache lives in.
    ///
    /// `BUILDCACHE_DIR` wins when set; otherwise `.buildcache` under the
    /// workspace root.
    #[must_use]
    pub fn cache_dir(&self, ctx: &JobContext) -> PathBuf {
        ctx.var("BUILDCACHE_DIR").map_or_else(
            || ctx.workspace().join(DEFAULT_CACHE_DIR_NAME),
            PathBuf::from,
        )
    }
}

/// Read a single step input, trimmed, empty when unset.
#[must_use]
pub fn input(name: &str) -> String {
    let var = format!("INPUT_{}", name.replace(' ', "_").to_uppercase());
    std::env::var(var)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_from_env_reads_inputs() {
        temp_env::with_vars(
            [
                ("INPUT_VERSION", Some("  v0.28.9 ")),
                ("INPUT_CACHE_KEY", Some("macos-clang")),
            ],
            || {
                let inputs = ActionInputs::from_env();
                assert_eq!(inputs.version, "v0.28.9");
                assert_eq!(inputs.cache_key.as_deref(), Some("macos-clang"));
            },
        );
    }

    #[test]
    fn test_from_env_missing_inputs() {
        temp_env::with_vars_unset(["INPUT_VERSION", "INPUT_CACHE_KEY"], || {
            let inputs = ActionInputs::from_env();
            assert_eq!(inputs, ActionInputs::default());
        });
    }

    #[test]
    fn test_input_name_normalization() {
        temp_env::with_var("INPUT_SOME_NAME", Some("value"), || {
            assert_eq!(input("some name"), "value");
        });
    }

    #[test]
    fn test_cache_dir_defaults_under_workspace() {
        let ctx = JobContext::new("/ws");
        let dir = ActionInputs::default().cache_dir(&ctx);
        assert_eq!(dir, Path::new("/ws/.buildcache"));
    }

    #[test]
    fn test_cache_dir_honours_buildcache_dir() {
        let ctx = JobContext::new("/ws").with_var("BUILDCACHE_DIR", "/cache/bc");
        let dir = ActionInputs::default().cache_dir(&ctx);
        assert_eq!(dir, Path::new("/cache/bc"));
    }
}
