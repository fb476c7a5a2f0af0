//! ops::rebase
//!
//! Multi-commit rebase through a pull-with-rebase inside an ephemeral
//! worktree.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::identity::ActingUser;
use crate::core::types::{Oid, RefName, WorktreeId};
use crate::git::GitError;
use crate::refs::RefTransaction;
use crate::repo::{Repository, INTERNAL_REMOTE_URL};

/// Where the rebase pulls from.
#[derive(Debug, Clone)]
pub enum RebaseSource {
    /// A repository on the local filesystem.
    Local(PathBuf),
    /// A remote repository collaborator, reached through the fixed
    /// internal URL with the collaborator's fetch environment.
    Internal { fetch_env: HashMap<String, String> },
}

/// A rebase request.
#[derive(Debug, Clone)]
pub struct RebaseRequest<'a> {
    pub user: &'a ActingUser,
    /// Unique id naming this rebase's worktree.
    pub rebase_id: &'a WorktreeId,
    /// The branch being rebased.
    pub branch: &'a str,
    /// The tip the caller last observed; finalization fails if the branch
    /// has moved past it.
    pub branch_sha: &'a Oid,
    pub source: &'a RebaseSource,
    /// Branch in the source repository to rebase against.
    pub source_branch: &'a str,
}

/// Rebase `branch` against `source_branch` of the source repository.
///
/// Runs `pull --rebase` in a worktree detached at the branch, reads the
/// resulting `HEAD`, and finalizes the branch to it with `branch_sha` as
/// the compare-and-swap expectation. Returns the new tip.
pub fn rebase(repo: &Repository, request: &RebaseRequest<'_>) -> Result<Oid, GitError> {
    let worktree_path = repo.worktree_path("rebase", request.rebase_id);
    let mut env = request.user.process_env(repo.repository_id());

    let remote = match request.source {
        RebaseSource::Local(path) => path.to_string_lossy().into_owned(),
        RebaseSource::Internal { fetch_env } => {
            env.extend(fetch_env.clone());
            INTERNAL_REMOTE_URL.to_string()
        }
    };

    let shell = repo.shell();
    repo.worktrees()
        .with_worktree(&worktree_path, request.branch, None, &env, |worktree| {
            shell
                .git(["pull", "--rebase", remote.as_str(), request.source_branch])
                .current_dir(worktree)
                .envs(&env)
                .timeout(shell.config().timeout)
                .run_checked()?;

            let head = shell
                .git(["rev-parse", "HEAD"])
                .current_dir(worktree)
                .envs(&env)
                .run_checked()?;
            let rebase_sha = Oid::new(String::from_utf8_lossy(&head).trim())?;

            let branch_ref = RefName::for_branch(request.branch)?;
            RefTransaction::new(shell, repo.store()).write_ref(
                branch_ref.as_str(),
                rebase_sha.as_str(),
                Some(request.branch_sha.to_string()),
            )?;

            Ok(rebase_sha)
        })
}
