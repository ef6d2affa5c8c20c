//! Cache statistics after restore.

use bcsetup_core::{Error, JobContext, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

/// Run `<binary> -s` against the restored cache and return its output.
///
/// The child sees the job search path and the exported variables, so it
/// reads the same cache directory later build steps will use. It runs in the
/// workspace when one is known, otherwise in the current directory.
///
/// # Errors
///
/// Returns an error if the binary cannot be spawned or exits unsuccessfully.
pub async fn collect_stats(binary: &Path, ctx: &JobContext) -> Result<String> {
    let mut command = Command::new(binary);
    command
        .arg("-s")
        .env("PATH", ctx.joined_search_path()?)
        .envs(ctx.exported());
    if !ctx.workspace().as_os_str().is_empty() {
        command.current_dir(ctx.workspace());
    }
    let output = command
        .output()
        .await
        .map_err(|e| Error::io(e, binary, "spawn"))?;

    if !output.status.success() {
        return Err(Error::configuration(format!(
            "{} -s exited with {}: {}",
            binary.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Log cache statistics; failures are warnings only.
pub async fn report_stats(binary: &Path, ctx: &JobContext) {
    match collect_stats(binary, ctx).await {
        Ok(stats) => info!("buildcache stats:\n{stats}"),
        Err(e) => warn!(error = %e, "could not read buildcache stats"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("buildcache");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_collects_stdout_with_exported_env() {
        let temp = TempDir::new().unwrap();
        let binary = script(temp.path(), r#"echo "$1 $BUILDCACHE_DIR""#);
        let mut ctx = JobContext::new(temp.path())
            .with_search_path(vec![std::path::PathBuf::from("/bin"), "/usr/bin".into()]);
        ctx.export_var("BUILDCACHE_DIR", "/ws/.buildcache").unwrap();

        let stats = collect_stats(&binary, &ctx).await.unwrap();
        assert_eq!(stats, "-s /ws/.buildcache");
    }

    #[tokio::test]
    async fn test_empty_workspace_runs_in_current_dir() {
        let temp = TempDir::new().unwrap();
        let binary = script(temp.path(), "pwd");
        let ctx = JobContext::new("")
            .with_search_path(vec![std::path::PathBuf::from("/bin"), "/usr/bin".into()]);

        let stats = collect_stats(&binary, &ctx).await.unwrap();
        assert_eq!(
            std::path::Path::new(&stats).canonicalize().unwrap(),
            std::env::current_dir().unwrap().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_failing_binary_is_error() {
        let temp = TempDir::new().unwrap();
        let binary = script(temp.path(), "echo broken >&2; exit 3");
        let ctx = JobContext::new(temp.path());

        let err = collect_stats(&binary, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let temp = TempDir::new().unwrap();
        let ctx = JobContext::new(temp.path());
        assert!(collect_stats(&temp.path().join("absent"), &ctx).await.is_err());
    }
}
