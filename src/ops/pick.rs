//! ops::pick
//!
//! Cherry-pick and revert: the two directions of applying one commit's
//! change onto a branch.
//!
//! Unlike merge, a conflict here is fatal ([`GitError::CreateTree`]), and
//! so is a computation that changes nothing - a pick that produces the
//! start commit's own tree would create an empty commit.
//!
//! Authorship differs between the two: a cherry-pick preserves the picked
//! commit's author identity and timestamp, a revert is authored by the
//! acting user. The committer is the acting user either way.

use crate::core::identity::ActingUser;
use crate::git::store::{CommitBlueprint, CommitSignature, PickMode, ThreeWayResult};
use crate::git::GitError;
use crate::ops::{BranchTransaction, BranchUpdate};
use crate::repo::Repository;

/// A cherry-pick or revert request.
#[derive(Debug, Clone)]
pub struct PickRequest<'a> {
    pub user: &'a ActingUser,
    /// Revision of the commit to pick or revert.
    pub commit: &'a str,
    /// The branch receiving the new commit.
    pub branch_name: &'a str,
    pub message: &'a str,
    /// Branch to resolve the start commit from when `branch_name` is being
    /// created by this operation.
    pub start_branch_name: Option<&'a str>,
}

/// Apply `request.commit`'s change onto the branch.
pub fn cherry_pick(
    repo: &Repository,
    request: &PickRequest<'_>,
) -> Result<Option<BranchUpdate>, GitError> {
    apply(repo, request, PickMode::CherryPick)
}

/// Apply the inverse of `request.commit`'s change onto the branch.
pub fn revert(
    repo: &Repository,
    request: &PickRequest<'_>,
) -> Result<Option<BranchUpdate>, GitError> {
    apply(repo, request, PickMode::Revert)
}

fn apply(
    repo: &Repository,
    request: &PickRequest<'_>,
    mode: PickMode,
) -> Result<Option<BranchUpdate>, GitError> {
    let store = repo.store();
    BranchTransaction::new(repo).with_branch(
        request.branch_name,
        request.start_branch_name,
        |start| {
            let start = start.ok_or_else(|| {
                GitError::InvalidRef(format!("branch not found: {}", request.branch_name))
            })?;
            let picked = store.resolve_commit(request.commit)?.ok_or_else(|| {
                GitError::InvalidRef(format!("commit not found: {}", request.commit))
            })?;

            // Picking a merge commit needs a designated mainline parent.
            let mainline = picked.is_merge().then_some(1);

            let tree = match store.pick_commit(&picked.oid, &start.oid, mainline, mode)? {
                ThreeWayResult::Conflict => {
                    return Err(GitError::CreateTree(format!(
                        "{} of {} onto {} conflicts",
                        describe(mode),
                        picked.oid,
                        start.oid
                    )))
                }
                ThreeWayResult::Tree(tree) => tree,
            };

            // A tree identical to the start commit's would produce an
            // empty commit; treat it like a conflict.
            if !store.diff_exists(start.oid.as_str(), tree.as_str())? {
                return Err(GitError::CreateTree(format!(
                    "{} of {} onto {} changes nothing",
                    describe(mode),
                    picked.oid,
                    start.oid
                )));
            }

            let committer = CommitSignature::now(request.user.identity.clone());
            let author = match mode {
                PickMode::CherryPick => CommitSignature::preserved(&picked.author),
                PickMode::Revert => committer.clone(),
            };

            let commit = store.create_commit(&CommitBlueprint {
                tree,
                parents: vec![start.oid.clone()],
                author,
                committer,
                message: request.message.to_string(),
            })?;
            Ok(Some(commit))
        },
    )
}

fn describe(mode: PickMode) -> &'static str {
    match mode {
        PickMode::CherryPick => "cherry-pick",
        PickMode::Revert => "revert",
    }
}
