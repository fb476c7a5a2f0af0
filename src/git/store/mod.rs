//! git::store
//!
//! The object-store seam.
//!
//! # Architecture
//!
//! [`ObjectStore`] covers the object-database operations the workflows
//! need: revision resolution, three-way tree computation, index
//! construction, commit creation, and single-ref writes. Two backends
//! satisfy it:
//!
//! - [`EmbeddedStore`] - in-process via `git2`
//! - [`CliStore`] - plumbing commands over [`GitShell`](crate::git::shell::GitShell)
//!
//! Workflows hold a `&dyn ObjectStore` and never name a backend.

mod cli;
mod embedded;

pub use cli::CliStore;
pub use embedded::EmbeddedStore;

use thiserror::Error;

use crate::core::identity::Identity;
use crate::core::types::{Oid, RefName};
use crate::git::GitError;

/// Author/committer timestamp: seconds since the epoch plus a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureTime {
    pub seconds: i64,
    pub offset_minutes: i32,
}

/// A resolved commit signature as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub name: String,
    pub email: String,
    pub when: SignatureTime,
}

/// A signature for a commit about to be written. `when: None` stamps the
/// current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSignature {
    pub identity: Identity,
    pub when: Option<SignatureTime>,
}

impl CommitSignature {
    /// A signature stamped with the current time.
    pub fn now(identity: Identity) -> Self {
        Self {
            identity,
            when: None,
        }
    }

    /// A signature preserving an existing author's identity and timestamp.
    pub fn preserved(info: &SignatureInfo) -> Self {
        Self {
            identity: Identity::new(info.name.clone(), info.email.clone()),
            when: Some(info.when),
        }
    }
}

/// A commit as the workflows see it: object ids plus authorship.
#[derive(Debug, Clone)]
pub struct CommitSnapshot {
    pub oid: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: SignatureInfo,
    pub committer: SignatureInfo,
}

impl CommitSnapshot {
    /// Whether the commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// Everything needed to write one commit object.
#[derive(Debug, Clone)]
pub struct CommitBlueprint {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: CommitSignature,
    pub committer: CommitSignature,
    pub message: String,
}

/// Outcome of a three-way tree computation.
///
/// `Conflict` means no tree was produced; whether that is an error is the
/// caller's decision, not the store's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreeWayResult {
    Tree(Oid),
    Conflict,
}

impl ThreeWayResult {
    /// The produced tree, if the combination was clean.
    pub fn tree(&self) -> Option<&Oid> {
        match self {
            ThreeWayResult::Tree(oid) => Some(oid),
            ThreeWayResult::Conflict => None,
        }
    }
}

/// Which direction a pick applies a commit's change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    /// Apply the commit's change onto the target.
    CherryPick,
    /// Apply the inverse of the commit's change onto the target.
    Revert,
}

/// One instruction of a multi-file commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitAction {
    /// Add a new file. Fails if the path already exists.
    Create {
        path: String,
        content: Vec<u8>,
        executable: bool,
    },
    /// Add an empty directory, realized as a `.gitkeep` placeholder.
    CreateDir { path: String },
    /// Replace an existing file's content, keeping its mode.
    Update { path: String, content: Vec<u8> },
    /// Rename a file, optionally replacing its content.
    Move {
        previous_path: String,
        path: String,
        content: Option<Vec<u8>>,
    },
    /// Remove an existing file.
    Delete { path: String },
    /// Toggle the executable bit on an existing file.
    Chmod { path: String, executable: bool },
}

/// Annotation for an annotated tag.
#[derive(Debug, Clone)]
pub struct TagAnnotation<'a> {
    pub tagger: &'a Identity,
    pub message: &'a str,
}

/// Failure classification for forced single-ref writes.
///
/// The direct-write path historically swallowed the first two cases; the
/// classification lets the ref layer preserve that behavior while telling
/// the caller it happened.
#[derive(Debug, Error)]
pub enum RefWriteError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref target not found: {0}")]
    NotFound(String),

    #[error("ref is locked: {0}")]
    LockContention(String),

    #[error(transparent)]
    Other(GitError),
}

/// Object-database operations, backend-agnostic.
pub trait ObjectStore: Send + Sync {
    /// Resolve a revision to the object it names, dereferencing annotated
    /// tags. `Ok(None)` when the revision does not resolve.
    fn resolve(&self, revspec: &str) -> Result<Option<Oid>, GitError>;

    /// Resolve a revision to a commit snapshot. `Ok(None)` when it does
    /// not resolve to a commit.
    fn resolve_commit(&self, revspec: &str) -> Result<Option<CommitSnapshot>, GitError>;

    /// Three-way merge of two commits against their merge base.
    fn merge_commits(&self, ours: &Oid, theirs: &Oid) -> Result<ThreeWayResult, GitError>;

    /// Apply (or inversely apply) one commit's change onto another commit.
    /// `mainline` selects the parent treated as the base when `commit` is
    /// itself a merge.
    fn pick_commit(
        &self,
        commit: &Oid,
        onto: &Oid,
        mainline: Option<u32>,
        mode: PickMode,
    ) -> Result<ThreeWayResult, GitError>;

    /// Build a tree by applying `actions` to `base`'s tree (or to the empty
    /// tree when `base` is `None`). Returns the new tree id.
    fn apply_commit_actions(
        &self,
        base: Option<&Oid>,
        actions: &[CommitAction],
    ) -> Result<Oid, GitError>;

    /// Write one commit object.
    fn create_commit(&self, blueprint: &CommitBlueprint) -> Result<Oid, GitError>;

    /// Create or force-update a reference.
    fn write_ref(&self, name: &RefName, target: &Oid) -> Result<(), RefWriteError>;

    /// Delete a reference. `GitError::InvalidRef` when it does not exist.
    fn delete_ref(&self, name: &RefName) -> Result<(), GitError>;

    /// All refs whose names start with `prefix`, with resolved targets.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError>;

    /// The merge base of two commits, if any.
    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError>;

    /// Whether `ancestor` is reachable from `descendant` (a commit counts
    /// as its own ancestor).
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError>;

    /// Whether two tree-ish revisions differ at all.
    fn diff_exists(&self, from: &str, to: &str) -> Result<bool, GitError>;

    /// Create a tag, annotated when `annotation` is supplied. Fails with
    /// `GitError::TagExists` on collision. Returns the created object id
    /// (the tag object for annotated tags, the target otherwise).
    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        annotation: Option<TagAnnotation<'_>>,
    ) -> Result<Oid, GitError>;

    /// Add a remote; when it already exists, its URL is updated instead.
    /// `mirror` configures an all-refs fetch mapping.
    fn add_remote(&self, name: &str, url: &str, mirror: bool) -> Result<(), GitError>;

    /// Remove a remote. Returns `false` when it did not exist. A mirror
    /// remote's fetch mapping is cleared first so mapped refs survive.
    fn remove_remote(&self, name: &str) -> Result<bool, GitError>;

    /// Point an existing remote at a new URL.
    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError>;
}

/// Validate a path appearing in a [`CommitAction`].
///
/// Rejects empty, absolute, and traversing paths before the index is
/// touched.
pub(crate) fn validate_action_path(path: &str) -> Result<(), GitError> {
    if path.is_empty() {
        return Err(GitError::InvalidArgument("path cannot be empty".into()));
    }
    if path.starts_with('/') {
        return Err(GitError::InvalidArgument(format!(
            "path must be relative: {path}"
        )));
    }
    if path
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(GitError::InvalidArgument(format!(
            "path contains disallowed components: {path}"
        )));
    }
    Ok(())
}
