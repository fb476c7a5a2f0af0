//! ops::squash
//!
//! Commit-range squashing through a sparse worktree.
//!
//! The range's binary diff is computed in the main repository, applied to
//! a worktree sparse-checked-out to just the pre-existing paths the diff
//! touches, and committed as a single commit with the supplied author.
//! Hooks are bypassed; the result never went through a working branch.

use crate::core::identity::{ActingUser, Identity};
use crate::core::types::{Oid, WorktreeId};
use crate::git::GitError;
use crate::repo::Repository;

/// A squash request.
#[derive(Debug, Clone)]
pub struct SquashRequest<'a> {
    pub user: &'a ActingUser,
    /// Unique id naming this squash's worktree.
    pub squash_id: &'a WorktreeId,
    /// Ref checked out into the worktree; the squash commit's parent.
    pub branch: &'a str,
    /// Start of the squashed range (exclusive side of `start...end`).
    pub start_sha: &'a Oid,
    /// End of the squashed range.
    pub end_sha: &'a Oid,
    /// Author of the resulting commit.
    pub author: &'a Identity,
    pub message: &'a str,
}

/// Squash `start_sha...end_sha` into one commit and return its id.
pub fn squash(repo: &Repository, request: &SquashRequest<'_>) -> Result<Oid, GitError> {
    let worktree_path = repo.worktree_path("squash", request.squash_id);
    let range = format!("{}...{}", request.start_sha, request.end_sha);

    let mut env = request.user.process_env(repo.repository_id());
    env.insert("GIT_AUTHOR_NAME".to_string(), request.author.name.clone());
    env.insert("GIT_AUTHOR_EMAIL".to_string(), request.author.email.clone());

    let shell = repo.shell();

    // Sparse checkout list: every touched path except added and renamed
    // ones (the lowercase filter excludes), since only pre-existing files
    // must be present for `apply` to patch them. A range that only adds
    // files yields an empty list, which still means sparse.
    let files_raw = shell
        .git(["diff", "--name-only", "--diff-filter=ar", "--binary", range.as_str()])
        .run_checked()?;
    let sparse_files: Vec<String> = String::from_utf8_lossy(&files_raw)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    repo.worktrees().with_worktree(
        &worktree_path,
        request.branch,
        Some(&sparse_files),
        &env,
        |worktree| {
            let diff = shell.git(["diff", "--binary", range.as_str()]).run_checked()?;

            shell
                .git(["apply", "--index", "--whitespace=nowarn"])
                .current_dir(worktree)
                .envs(&env)
                .stdin_bytes(diff)
                .run_checked()?;

            shell
                .git(["commit", "--no-verify", "--message", request.message])
                .current_dir(worktree)
                .envs(&env)
                .run_checked()?;

            // --quiet suppresses the ambiguity warning another ref named
            // HEAD would trigger; this HEAD is always the checked-out
            // commit.
            let head = shell
                .git(["rev-parse", "--quiet", "--verify", "HEAD"])
                .current_dir(worktree)
                .envs(&env)
                .run_checked()?;
            Ok(Oid::new(String::from_utf8_lossy(&head).trim())?)
        },
    )
}
