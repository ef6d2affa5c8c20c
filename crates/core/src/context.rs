//! Explicit view of the CI job environment.
//!
//! Stages never read or mutate process-wide state directly. The workspace
//! root, the executable search path and the runner's command files are all
//! carried by a [`JobContext`] that is built once from the environment and
//! passed down, so tests can hand in a fake one.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// CI job environment for a single setup run.
#[derive(Debug, Clone)]
pub struct JobContext {
    workspace: PathBuf,
    temp_dir: PathBuf,
    search_path: Vec<PathBuf>,
    /// `$GITHUB_PATH`: directories appended here are on `PATH` for later steps.
    path_file: Option<PathBuf>,
    /// `$GITHUB_ENV`: `NAME=value` lines appended here are exported to later steps.
    env_file: Option<PathBuf>,
    vars: BTreeMap<String, String>,
    exported: BTreeMap<String, String>,
}

impl JobContext {
    /// Create a context rooted at `workspace` with an empty search path and
    /// no runner command files.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            temp_dir: std::env::temp_dir(),
            search_path: Vec::new(),
            path_file: None,
            env_file: None,
            vars: BTreeMap::new(),
            exported: BTreeMap::new(),
        }
    }

    /// Build the context from the current process environment.
    ///
    /// `GITHUB_WORKSPACE` defaults to an empty path when unset, which resolves
    /// relative to the current directory.
    #[must_use]
    pub fn from_env() -> Self {
        let workspace = std::env::var_os("GITHUB_WORKSPACE").unwrap_or_default();
        let temp_dir = std::env::var_os("RUNNER_TEMP")
            .filter(|v| !v.is_empty())
            .map_or_else(std::env::temp_dir, PathBuf::from);
        let search_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        let non_empty = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Self {
            workspace: PathBuf::from(workspace),
            temp_dir,
            search_path,
            path_file: non_empty("GITHUB_PATH"),
            env_file: non_empty("GITHUB_ENV"),
            vars: std::env::vars().collect(),
            exported: BTreeMap::new(),
        }
    }

    /// Set the directory used for downloads and other scratch files.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Set the initial executable search path.
    #[must_use]
    pub fn with_search_path(mut self, path: Vec<PathBuf>) -> Self {
        self.search_path = path;
        self
    }

    /// Set the runner file that receives search path additions.
    #[must_use]
    pub fn with_path_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.path_file = Some(file.into());
        self
    }

    /// Set the runner file that receives exported variables.
    #[must_use]
    pub fn with_env_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(file.into());
        self
    }

    /// Set an environment variable visible through [`JobContext::var`].
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// The job's workspace root.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Scratch directory for downloads.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Current executable search path, highest precedence first.
    #[must_use]
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Look up a variable, treating empty values as unset.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.exported
            .get(name)
            .or_else(|| self.vars.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Variables exported during this run.
    #[must_use]
    pub fn exported(&self) -> &BTreeMap<String, String> {
        &self.exported
    }

    /// Search path joined with the platform separator, for child processes.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry contains the path separator.
    pub fn joined_search_path(&self) -> Result<OsString> {
        std::env::join_paths(&self.search_path)
            .map_err(|e| Error::configuration(format!("Invalid search path entry: {e}")))
    }

    /// Put `dir` in front of the search path for the rest of the job.
    ///
    /// The in-process path is updated first; when the runner provides
    /// `$GITHUB_PATH`, the directory is also appended there so later steps
    /// see it. Adding a directory that is already first is a no-op for the
    /// in-process path.
    ///
    /// # Errors
    ///
    /// Returns an error if `$GITHUB_PATH` cannot be written.
    pub fn add_path(&mut self, dir: &Path) -> Result<()> {
        if self.search_path.first().map(PathBuf::as_path) != Some(dir) {
            self.search_path.retain(|p| p != dir);
            self.search_path.insert(0, dir.to_path_buf());
        }

        if let Some(file) = &self.path_file {
            append_line(file, &dir.to_string_lossy())?;
            debug!(dir = %dir.display(), file = %file.display(), "Appended to runner path file");
        }
        Ok(())
    }

    /// Export a variable to later steps of the job.
    ///
    /// Values containing newlines are rejected; the runner file format is
    /// line-oriented.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name, a multi-line value or an
    /// unwritable `$GITHUB_ENV`.
    pub fn export_var(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || name.contains('=') {
            return Err(Error::configuration(format!(
                "Invalid environment variable name '{name}'"
            )));
        }
        if value.contains('\n') || value.contains('\r') {
            return Err(Error::configuration(format!(
                "Value for {name} must be a single line"
            )));
        }

        if let Some(file) = &self.env_file {
            append_line(file, &format!("{name}={value}"))?;
        }
        self.exported.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

fn append_line(file: &Path, line: &str) -> Result<()> {
    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .map_err(|e| Error::io(e, file, "open"))?;
    writeln!(handle, "{line}").map_err(|e| Error::io(e, file, "append"))
}
