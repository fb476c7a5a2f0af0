//! git
//!
//! The doorway to the underlying version-control system: the error
//! taxonomy, the subprocess shell, and the object-store seam.
//!
//! # Architecture
//!
//! Higher layers never spawn `git` themselves and never import `git2`
//! directly. They go through:
//!
//! - [`shell::GitShell`] - runs plumbing commands with the repository's
//!   environment (alternates, user attribution), captured output, and an
//!   optional wall-clock timeout
//! - [`store::ObjectStore`] - the object-database seam with an embedded
//!   (`git2`) backend and a CLI-driven backend
//!
//! Workflows depend on the trait, not on a specific backend, so either can
//! satisfy them.

pub mod shell;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::TypeError;

/// Errors from repository operations.
///
/// Subprocess failures carry the captured combined output; validation
/// failures are raised before anything is spawned.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path does not hold a repository.
    #[error("no repository at {path}")]
    NoRepository {
        /// The path that was probed
        path: PathBuf,
    },

    /// The repository exists but is unusable.
    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    /// A target ref or revision could not be resolved.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// A plumbing command exited non-zero.
    #[error("{context}: {output}")]
    Command {
        /// What was being attempted, including the operands
        context: String,
        /// Captured combined stdout/stderr
        output: String,
    },

    /// A branch could not be deleted.
    #[error("could not delete branch: {0}")]
    DeleteBranch(String),

    /// A three-way tree computation conflicted or produced no change.
    #[error("could not create tree: {0}")]
    CreateTree(String),

    /// The tag already exists.
    #[error("tag already exists: {0}")]
    TagExists(String),

    /// The repository checksum could not be computed.
    #[error("could not compute checksum: {0}")]
    Checksum(String),

    /// A caller-supplied argument was rejected before spawning anything.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command exceeded its wall-clock limit and was terminated.
    #[error("{context}: timed out after {timeout:?}")]
    Timeout {
        /// What was being attempted
        context: String,
        /// The limit that was exceeded
        timeout: Duration,
    },

    /// The embedded object-store binding failed.
    #[error("object store error: {0}")]
    Store(String),

    /// An I/O failure outside any subprocess.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::InvalidArgument(err.to_string())
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Store(err.message().to_string())
    }
}
