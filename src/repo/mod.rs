//! repo
//!
//! The repository façade.
//!
//! # Architecture
//!
//! [`Repository`] holds the repository's identity (storage name, relative
//! path, absolute path, alternate object directories) and composes the
//! narrower components - [`RefTransaction`](crate::refs::RefTransaction),
//! the diff stream, [`rev-list` traversal](crate::revlist), and the
//! [worktree manager](crate::worktree::WorktreeManager) - into the public
//! operation set. It owns no long-lived subprocess or worktree state;
//! every operation allocates and releases its own.
//!
//! Identity is `(storage, relative_path)`: two handles with different
//! absolute paths but the same storage and relative path are equal.
//!
//! Ref-mutating operations always finalize through the ref transaction;
//! nothing in this module writes a ref ad hoc.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::config::GitConfig;
use crate::core::identity::ActingUser;
use crate::core::types::{Oid, RefName, WorktreeId};
use crate::core::version::GitVersion;
use crate::diff::stream;
use crate::diff::RawDiffChange;
use crate::git::shell::GitShell;
use crate::git::store::{CommitSnapshot, EmbeddedStore, ObjectStore, TagAnnotation};
use crate::git::GitError;
use crate::ops;
use crate::ops::actions::MultiFileCommitRequest;
use crate::ops::pick::PickRequest;
use crate::ops::rebase::RebaseRequest;
use crate::ops::squash::SquashRequest;
use crate::ops::BranchUpdate;
use crate::refs::{RefTransaction, RefUpdate, WriteRefOutcome};
use crate::revlist::lfs::LfsChanges;
use crate::revlist::{self, RevListQuery, Traversal};
use crate::worktree::WorktreeManager;

/// Fixed URL substituted for remote collaborators; the collaborator's
/// fetch environment routes it.
pub const INTERNAL_REMOTE_URL: &str = "ssh://capstan/internal.git";

/// Checksum of a repository with no refs at all.
pub const EMPTY_REPOSITORY_CHECKSUM: &str = "0000000000000000000000000000000000000000";

/// Which write path a single-ref write takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRefStrategy {
    /// Through `update-ref --stdin -z`; failures are errors.
    Batched,
    /// Through the object-store binding; some failures are reported as
    /// skipped outcomes (see [`WriteRefOutcome`]).
    Direct,
}

/// A shell `log` query.
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Revision to walk from; `HEAD` when absent (ignored with `all`).
    pub ref_name: Option<String>,
    /// Walk every ref, oldest first.
    pub all: bool,
    pub limit: usize,
    pub offset: usize,
    /// Follow renames; only honored when exactly paths are given.
    pub follow: bool,
    pub skip_merges: bool,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub paths: Vec<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            ref_name: None,
            all: false,
            limit: 100,
            offset: 0,
            follow: false,
            skip_merges: false,
            after: None,
            before: None,
            paths: Vec::new(),
        }
    }
}

/// A handle to one repository on disk.
pub struct Repository {
    storage: String,
    relative_path: String,
    path: PathBuf,
    alternate_object_dirs: Vec<PathBuf>,
    repository_id: Option<String>,
    shell: GitShell,
    store: Arc<dyn ObjectStore>,
    raw_changes_cache: Mutex<HashMap<(String, String), Arc<Vec<RawDiffChange>>>>,
    git_version: OnceLock<GitVersion>,
}

impl Repository {
    /// Open a handle.
    ///
    /// `alternate_object_dirs` are relative to `path` and joined onto it;
    /// they reach every spawned process via
    /// `GIT_ALTERNATE_OBJECT_DIRECTORIES` and the embedded store via its
    /// own alternates mechanism. The handle is not validated here - see
    /// [`exists`](Self::exists).
    pub fn open(
        config: GitConfig,
        storage: impl Into<String>,
        relative_path: impl Into<String>,
        path: impl Into<PathBuf>,
        alternate_object_dirs: &[String],
        repository_id: Option<String>,
    ) -> Self {
        let path = path.into();
        let alternates: Vec<PathBuf> = alternate_object_dirs
            .iter()
            .map(|dir| path.join(dir))
            .collect();
        let shell = GitShell::new(config, path.clone(), alternates.clone());
        let store = Arc::new(EmbeddedStore::new(path.clone(), alternates.clone()));
        Self {
            storage: storage.into(),
            relative_path: relative_path.into(),
            path,
            alternate_object_dirs: alternates,
            repository_id,
            shell,
            store,
            raw_changes_cache: Mutex::new(HashMap::new()),
            git_version: OnceLock::new(),
        }
    }

    /// Replace the object-store backend (e.g. with
    /// [`CliStore`](crate::git::store::CliStore)).
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = store;
        self
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn alternate_object_directories(&self) -> &[PathBuf] {
        &self.alternate_object_dirs
    }

    pub fn repository_id(&self) -> Option<&str> {
        self.repository_id.as_deref()
    }

    pub(crate) fn shell(&self) -> &GitShell {
        &self.shell
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn worktrees(&self) -> WorktreeManager<'_> {
        WorktreeManager::new(&self.shell)
    }

    /// Whether the path holds a repository (probed by its refs
    /// directory, which even an empty repository has).
    pub fn exists(&self) -> bool {
        self.path.join("refs").exists()
    }

    /// Integrity-check the object database.
    pub fn fsck(&self) -> Result<(), GitError> {
        let git_dir = format!("--git-dir={}", self.path.display());
        self.shell.git([git_dir.as_str(), "fsck"]).nice(true).run_checked()?;
        Ok(())
    }

    /// The installed git tool version, probed once per handle.
    pub fn git_version(&self) -> Result<GitVersion, GitError> {
        if let Some(version) = self.git_version.get() {
            return Ok(*version);
        }
        let output = self.shell.git(["version"]).run_checked()?;
        let version = GitVersion::parse(&String::from_utf8_lossy(&output))
            .map_err(|e| GitError::Store(e.to_string()))?;
        Ok(*self.git_version.get_or_init(|| version))
    }

    // ------------------------------------------------------------------
    // Refs and branches
    // ------------------------------------------------------------------

    /// Resolve a revision to the object it names.
    pub fn lookup(&self, revspec: &str) -> Result<Option<Oid>, GitError> {
        self.store.resolve(revspec)
    }

    /// Resolve a revision to a commit.
    pub fn commit(&self, revspec: &str) -> Result<Option<CommitSnapshot>, GitError> {
        self.store.resolve_commit(revspec)
    }

    /// Write one ref through the chosen strategy.
    pub fn write_ref(
        &self,
        name: &str,
        target: &str,
        old_target: Option<String>,
        strategy: WriteRefStrategy,
    ) -> Result<WriteRefOutcome, GitError> {
        match strategy {
            WriteRefStrategy::Batched => {
                self.ref_transaction().write_ref(name, target, old_target)?;
                Ok(WriteRefOutcome::Applied)
            }
            WriteRefStrategy::Direct => {
                let name = RefName::new(name)?;
                let target = Oid::new(target)?;
                self.ref_transaction().write_ref_direct(&name, &target)
            }
        }
    }

    /// Delete refs as one atomic batch.
    pub fn delete_refs(&self, names: &[&str]) -> Result<(), GitError> {
        let updates = names
            .iter()
            .map(|name| RefUpdate::delete(name, None))
            .collect::<Result<Vec<_>, _>>()?;
        self.ref_transaction().commit(&updates)
    }

    /// Delete every ref whose name starts with none of `prefixes`.
    pub fn delete_all_refs_except(&self, prefixes: &[&str]) -> Result<(), GitError> {
        let doomed: Vec<String> = self
            .store
            .list_refs("refs/")?
            .into_iter()
            .map(|(name, _)| String::from(name))
            .filter(|name| !prefixes.iter().any(|prefix| name.starts_with(prefix)))
            .collect();
        let names: Vec<&str> = doomed.iter().map(String::as_str).collect();
        self.delete_refs(&names)
    }

    /// Local branch names, without the `refs/heads/` prefix.
    pub fn branch_names(&self) -> Result<Vec<String>, GitError> {
        self.ref_shorthands("refs/heads/")
    }

    /// Tag names, without the `refs/tags/` prefix.
    pub fn tag_names(&self) -> Result<Vec<String>, GitError> {
        self.ref_shorthands("refs/tags/")
    }

    fn ref_shorthands(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        Ok(self
            .store
            .list_refs(prefix)?
            .into_iter()
            .filter_map(|(name, _)| {
                name.as_str().strip_prefix(prefix).map(str::to_string)
            })
            .collect())
    }

    /// Whether a branch exists. An invalid name is just a missing branch.
    pub fn branch_exists(&self, name: &str) -> bool {
        let Ok(branch_ref) = RefName::for_branch(name) else {
            return false;
        };
        matches!(self.store.resolve(branch_ref.as_str()), Ok(Some(_)))
    }

    /// Create a branch at `target`. The target may be any revision
    /// resolving to a commit (annotated tags are dereferenced).
    pub fn add_branch(
        &self,
        name: &str,
        _user: &ActingUser,
        target: &str,
    ) -> Result<Oid, GitError> {
        let commit = self
            .store
            .resolve_commit(target)?
            .ok_or_else(|| GitError::InvalidRef(format!("target not found: {target}")))?;
        let branch_ref = RefName::for_branch(name)?;
        self.ref_transaction().write_ref(
            branch_ref.as_str(),
            commit.oid.as_str(),
            Some(Oid::zero().to_string()),
        )?;
        Ok(commit.oid)
    }

    /// Delete a branch on behalf of a user, compare-and-swapped against
    /// its current tip.
    pub fn rm_branch(&self, name: &str, _user: &ActingUser) -> Result<(), GitError> {
        let branch_ref = RefName::for_branch(name)?;
        let current = self
            .store
            .resolve(branch_ref.as_str())?
            .ok_or_else(|| GitError::InvalidRef(format!("branch not found: {name}")))?;
        self.ref_transaction().commit(&[RefUpdate::delete(
            branch_ref.as_str(),
            Some(current.to_string()),
        )?])
    }

    /// Delete a branch unconditionally through the store binding.
    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        let branch_ref = RefName::for_branch(name)?;
        self.store
            .delete_ref(&branch_ref)
            .map_err(|e| GitError::DeleteBranch(e.to_string()))
    }

    /// Create a tag at `target`, annotated when a message is supplied.
    pub fn add_tag(
        &self,
        name: &str,
        user: &ActingUser,
        target: &str,
        message: Option<&str>,
    ) -> Result<Oid, GitError> {
        let commit = self
            .store
            .resolve_commit(target)?
            .ok_or_else(|| GitError::InvalidRef(format!("target not found: {target}")))?;
        let annotation = message.map(|message| TagAnnotation {
            tagger: &user.identity,
            message,
        });
        self.store.create_tag(name, &commit.oid, annotation)
    }

    /// Delete a tag, compare-and-swapped against its current target.
    pub fn rm_tag(&self, name: &str, _user: &ActingUser) -> Result<(), GitError> {
        let tag_ref = RefName::for_tag(name)?;
        let current = self
            .store
            .resolve(tag_ref.as_str())?
            .ok_or_else(|| GitError::InvalidRef(format!("tag not found: {name}")))?;
        self.ref_transaction().commit(&[RefUpdate::delete(
            tag_ref.as_str(),
            Some(current.to_string()),
        )?])
    }

    /// The merge base of two commits.
    pub fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        self.store.merge_base(a, b)
    }

    /// Whether `from` is an ancestor of `to`. Unresolvable inputs and
    /// store failures are simply "no".
    pub fn ancestor(&self, from: &str, to: &str) -> bool {
        let (Ok(from_oid), Ok(to_oid)) = (Oid::new(from), Oid::new(to)) else {
            return false;
        };
        matches!(
            self.store.merge_base(&from_oid, &to_oid),
            Ok(Some(base)) if base == from_oid
        )
    }

    fn ref_transaction(&self) -> RefTransaction<'_> {
        RefTransaction::new(&self.shell, self.store.as_ref())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Commit ids from a shell `log` walk.
    pub fn log(&self, query: &LogQuery) -> Result<Vec<Oid>, GitError> {
        let sha = if query.all {
            None
        } else {
            let spec = query.ref_name.as_deref().unwrap_or("HEAD");
            match self.store.resolve(spec)? {
                Some(oid) => Some(oid),
                // An unknown starting ref yields an empty log, not an
                // error.
                None => return Ok(Vec::new()),
            }
        };

        let (args, drop_count) = build_log_args(query, sha.as_ref());
        let output = self.shell.git(&args).run()?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .skip(drop_count)
            .filter_map(|line| Oid::new(line.trim()).ok())
            .collect())
    }

    /// Structured change records between two revisions, memoized per
    /// `(old_rev, new_rev)` for the lifetime of this handle.
    pub fn raw_changes_between(
        &self,
        old_rev: &str,
        new_rev: &str,
    ) -> Result<Arc<Vec<RawDiffChange>>, GitError> {
        let key = (old_rev.to_string(), new_rev.to_string());
        {
            let cache = lock_unpoisoned(&self.raw_changes_cache);
            if let Some(cached) = cache.get(&key) {
                return Ok(Arc::clone(cached));
            }
        }
        let changes = Arc::new(stream::raw_changes_between(&self.shell, old_rev, new_rev)?);
        let mut cache = lock_unpoisoned(&self.raw_changes_cache);
        Ok(Arc::clone(cache.entry(key).or_insert(changes)))
    }

    /// Start a streaming object-graph traversal.
    pub fn rev_list(&self, query: &RevListQuery) -> Result<Traversal, GitError> {
        revlist::spawn(&self.shell, query)
    }

    /// LFS pointer discovery rooted at `newrev`.
    pub fn lfs_changes(&self, newrev: impl Into<String>) -> LfsChanges<'_> {
        LfsChanges::new(self, newrev)
    }

    /// XOR-accumulated digest over all refs. The empty repository has the
    /// all-zero checksum.
    pub fn checksum(&self) -> Result<String, GitError> {
        let output = self.shell.git(["show-ref", "--head"]).run()?;
        if !output.success() {
            if self.exists() {
                return Ok(EMPTY_REPOSITORY_CHECKSUM.to_string());
            }
            return Err(GitError::NoRepository {
                path: self.path.clone(),
            });
        }

        let mut sum = [0u8; 20];
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let valid = line
                .split_once(' ')
                .is_some_and(|(oid, name)| {
                    !name.is_empty()
                        && !oid.is_empty()
                        && oid.chars().all(|c| c.is_ascii_hexdigit())
                });
            if !valid {
                return Err(GitError::Checksum(format!("malformed ref line: {line:?}")));
            }
            let digest = Sha256::digest(line.as_bytes());
            for (acc, byte) in sum.iter_mut().zip(digest.iter()) {
                *acc ^= byte;
            }
        }
        Ok(hex::encode(sum))
    }

    // ------------------------------------------------------------------
    // Fetching and remotes
    // ------------------------------------------------------------------

    /// Fetch one ref from a remote collaborator into `target_ref`.
    pub fn fetch_ref(
        &self,
        fetch_env: &HashMap<String, String>,
        source_ref: &str,
        target_ref: &str,
    ) -> Result<(), GitError> {
        let refspec = format!("{source_ref}:{target_ref}");
        self.shell
            .git(["fetch", "--no-tags", "-f", INTERNAL_REMOTE_URL, &refspec])
            .envs(fetch_env)
            .timeout(self.shell.config().timeout)
            .run_checked()?;
        Ok(())
    }

    /// Copy a collaborator's branch head into `local_ref`.
    ///
    /// The branch is fetched into a temporary ref that is deleted on
    /// every path. Returns `false` when the source branch cannot be
    /// fetched or does not exist.
    pub fn fetch_source_branch(
        &self,
        fetch_env: &HashMap<String, String>,
        source_branch: &str,
        local_ref: &str,
    ) -> Result<bool, GitError> {
        let source_ref = if source_branch.starts_with("refs/") {
            source_branch.to_string()
        } else {
            format!("refs/heads/{source_branch}")
        };
        let tmp_ref = format!("refs/tmp/{}", Uuid::new_v4().simple());

        if self.fetch_ref(fetch_env, &source_ref, &tmp_ref).is_err() {
            let _ = self.delete_refs(&[&tmp_ref]);
            return Ok(false);
        }

        let result = match self.store.resolve(&tmp_ref)? {
            Some(oid) => {
                self.ref_transaction()
                    .write_ref(local_ref, oid.as_str(), None)?;
                true
            }
            None => false,
        };
        self.delete_refs(&[&tmp_ref])?;
        Ok(result)
    }

    /// Fetch a configured remote. Returns whether the fetch succeeded.
    pub fn fetch_remote(
        &self,
        remote: &str,
        env: &HashMap<String, String>,
    ) -> Result<bool, GitError> {
        let output = self
            .shell
            .git(["fetch", remote])
            .envs(env)
            .timeout(self.shell.config().timeout)
            .run()?;
        Ok(output.success())
    }

    /// Add a remote; `mirror` maps all refs into the top-level namespace.
    pub fn add_remote(&self, name: &str, url: &str, mirror: bool) -> Result<(), GitError> {
        self.store.add_remote(name, url, mirror)
    }

    /// Remove a remote; `false` when it did not exist.
    pub fn remove_remote(&self, name: &str) -> Result<bool, GitError> {
        self.store.remove_remote(name)
    }

    /// Point a remote at a new URL.
    pub fn update_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.store.set_remote_url(name, url)
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// See [`ops::merge::merge`].
    pub fn merge(
        &self,
        user: &ActingUser,
        source: &Oid,
        target_branch: &str,
        message: &str,
    ) -> Result<Option<BranchUpdate>, GitError> {
        ops::merge::merge(self, user, source, target_branch, message)
    }

    /// See [`ops::merge::ff_merge`].
    pub fn ff_merge(
        &self,
        user: &ActingUser,
        source: &Oid,
        target_branch: &str,
    ) -> Result<BranchUpdate, GitError> {
        ops::merge::ff_merge(self, user, source, target_branch)
    }

    /// See [`ops::pick::cherry_pick`].
    pub fn cherry_pick(
        &self,
        request: &PickRequest<'_>,
    ) -> Result<Option<BranchUpdate>, GitError> {
        ops::pick::cherry_pick(self, request)
    }

    /// See [`ops::pick::revert`].
    pub fn revert(&self, request: &PickRequest<'_>) -> Result<Option<BranchUpdate>, GitError> {
        ops::pick::revert(self, request)
    }

    /// See [`ops::rebase::rebase`].
    pub fn rebase(&self, request: &RebaseRequest<'_>) -> Result<Oid, GitError> {
        ops::rebase::rebase(self, request)
    }

    /// See [`ops::squash::squash`].
    pub fn squash(&self, request: &SquashRequest<'_>) -> Result<Oid, GitError> {
        ops::squash::squash(self, request)
    }

    /// See [`ops::actions::multi_file_commit`].
    pub fn multi_file_commit(
        &self,
        request: &MultiFileCommitRequest<'_>,
    ) -> Result<Option<BranchUpdate>, GitError> {
        ops::actions::multi_file_commit(self, request)
    }

    /// Directory for one ephemeral worktree, under the reserved worktree
    /// subdirectory of the repository.
    pub fn worktree_path(&self, prefix: &str, id: &WorktreeId) -> PathBuf {
        self.path
            .join(&self.shell.config().worktree_dir)
            .join(format!("{prefix}-{id}"))
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        (self.storage.as_str(), self.relative_path.as_str())
            == (other.storage.as_str(), other.relative_path.as_str())
    }
}

impl Eq for Repository {}

impl std::hash::Hash for Repository {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.storage.hash(state);
        self.relative_path.hash(state);
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("storage", &self.storage)
            .field("relative_path", &self.relative_path)
            .field("path", &self.path)
            .finish()
    }
}

fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build the `log` argument list.
///
/// `--follow` does not combine with `--skip`, so when both are requested
/// the skip happens in-process: the limit is widened by the offset and
/// the caller drops that many leading lines (the returned count).
fn build_log_args(query: &LogQuery, sha: Option<&Oid>) -> (Vec<String>, usize) {
    let use_follow = query.follow && !query.paths.is_empty();
    let offset_in_process = use_follow && query.offset > 0;

    let mut limit = query.limit;
    if offset_in_process {
        limit += query.offset;
    }

    let mut args = vec![
        "log".to_string(),
        format!("--max-count={limit}"),
        "--format=%H".to_string(),
    ];
    if query.offset > 0 && !offset_in_process {
        args.push(format!("--skip={}", query.offset));
    }
    if use_follow {
        args.push("--follow".to_string());
    }
    if query.skip_merges {
        args.push("--no-merges".to_string());
    }
    if let Some(after) = &query.after {
        args.push(format!("--after={}", after.to_rfc3339()));
    }
    if let Some(before) = &query.before {
        args.push(format!("--before={}", before.to_rfc3339()));
    }
    if query.all {
        args.push("--all".to_string());
        args.push("--reverse".to_string());
    } else if let Some(sha) = sha {
        args.push(sha.to_string());
    }
    if !query.paths.is_empty() {
        args.push("--".to_string());
        args.extend(query.paths.iter().cloned());
    }

    (args, if offset_in_process { query.offset } else { 0 })
}
