//! core::config
//!
//! Tool configuration, loaded once and injected into every component at
//! construction. No component reads process-wide state at call time.
//!
//! # Locations
//!
//! Searched in order:
//! 1. `$CAPSTAN_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/capstan/config.toml`
//! 3. `~/.capstan/config.toml`
//!
//! Missing files are not an error; defaults apply.
//!
//! # Example
//!
//! ```toml
//! [git]
//! bin-path = "/usr/bin/git"
//! timeout-seconds = 3600
//!
//! [worktree]
//! dir = "capstan-worktree"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Resolved configuration for the git layer.
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Path to the git binary.
    pub bin_path: PathBuf,
    /// Wall-clock limit for long-running invocations (fetches, pulls).
    /// `None` disables the limit.
    pub timeout: Option<Duration>,
    /// Directory under the repository path that holds ephemeral worktrees.
    pub worktree_dir: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from("git"),
            timeout: Some(Duration::from_secs(3600)),
            worktree_dir: "capstan-worktree".to_string(),
        }
    }
}

impl GitConfig {
    /// Load configuration from the standard locations, falling back to
    /// defaults when no file is present.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CAPSTAN_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("capstan/config.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".capstan/config.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: FileSchema =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(schema.resolve())
    }
}

/// On-disk schema. All fields optional; unset fields take defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSchema {
    #[serde(default)]
    git: GitSection,
    #[serde(default)]
    worktree: WorktreeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct GitSection {
    bin_path: Option<PathBuf>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorktreeSection {
    dir: Option<String>,
}

impl FileSchema {
    fn resolve(self) -> GitConfig {
        let defaults = GitConfig::default();
        GitConfig {
            bin_path: self.git.bin_path.unwrap_or(defaults.bin_path),
            timeout: match self.git.timeout_seconds {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.timeout,
            },
            worktree_dir: self.worktree.dir.unwrap_or(defaults.worktree_dir),
        }
    }
}
