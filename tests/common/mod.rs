//! Shared fixtures for integration tests.
//!
//! Repositories are seeded through the crate's own multi-file commit
//! path, so fixtures exercise the same machinery the tests then assert
//! on.

#![allow(dead_code)]

use std::process::Command;

use tempfile::TempDir;

use capstan::core::config::GitConfig;
use capstan::core::identity::{ActingUser, Identity};
use capstan::core::types::Oid;
use capstan::git::store::CommitAction;
use capstan::ops::actions::MultiFileCommitRequest;
use capstan::repo::Repository;

/// The user all fixture mutations act as.
pub fn acting_user() -> ActingUser {
    ActingUser::new("Test User", "test@example.com", "user-1")
}

/// A bare repository plus a handle onto it.
pub fn init_bare_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("temp dir");
    let status = Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(dir.path())
        .status()
        .expect("git init --bare");
    assert!(status.success(), "git init --bare failed");

    // The default branch name varies across git versions; the fixtures
    // commit to `main`, so point HEAD there regardless.
    let status = Command::new("git")
        .args(["symbolic-ref", "HEAD", "refs/heads/main"])
        .current_dir(dir.path())
        .status()
        .expect("git symbolic-ref");
    assert!(status.success(), "git symbolic-ref failed");

    let repo = Repository::open(
        GitConfig::default(),
        "default",
        "fixture.git",
        dir.path(),
        &[],
        Some("fixture-project".into()),
    );
    (dir, repo)
}

/// Commit `actions` on `branch` and return the new tip.
pub fn commit_actions(
    repo: &Repository,
    branch: &str,
    message: &str,
    actions: &[CommitAction],
) -> Oid {
    commit_actions_as(repo, branch, message, actions, None)
}

/// Commit `actions` on `branch` with an author override.
pub fn commit_actions_as(
    repo: &Repository,
    branch: &str,
    message: &str,
    actions: &[CommitAction],
    author: Option<&Identity>,
) -> Oid {
    let user = acting_user();
    let update = repo
        .multi_file_commit(&MultiFileCommitRequest {
            user: &user,
            branch_name: branch,
            message,
            actions,
            author,
            start_branch_name: None,
        })
        .expect("multi-file commit")
        .expect("commit produced an update");
    update.newrev
}

/// Add a file in one commit.
pub fn commit_new_file(repo: &Repository, branch: &str, path: &str, content: &str) -> Oid {
    commit_actions(
        repo,
        branch,
        &format!("add {path}"),
        &[CommitAction::Create {
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
            executable: false,
        }],
    )
}

/// Replace a file's content in one commit.
pub fn commit_file_update(repo: &Repository, branch: &str, path: &str, content: &str) -> Oid {
    commit_actions(
        repo,
        branch,
        &format!("update {path}"),
        &[CommitAction::Update {
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
        }],
    )
}

/// Create `branch` pointing at `target`.
pub fn create_branch(repo: &Repository, branch: &str, target: &Oid) {
    repo.add_branch(branch, &acting_user(), target.as_str())
        .expect("add branch");
}

/// The current tip of `branch`.
pub fn branch_tip(repo: &Repository, branch: &str) -> Option<Oid> {
    repo.lookup(&format!("refs/heads/{branch}"))
        .expect("lookup branch")
}
