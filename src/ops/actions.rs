//! ops::actions
//!
//! Multi-file commit: apply a batch of file instructions to a branch's
//! tree and commit the result in one step.

use crate::core::identity::{ActingUser, Identity};
use crate::git::store::{CommitAction, CommitBlueprint, CommitSignature};
use crate::git::GitError;
use crate::ops::{BranchTransaction, BranchUpdate};
use crate::repo::Repository;

/// A multi-file commit request.
#[derive(Debug, Clone)]
pub struct MultiFileCommitRequest<'a> {
    pub user: &'a ActingUser,
    pub branch_name: &'a str,
    pub message: &'a str,
    pub actions: &'a [CommitAction],
    /// Author override; the acting user when absent.
    pub author: Option<&'a Identity>,
    /// Branch to start from when `branch_name` does not exist yet.
    pub start_branch_name: Option<&'a str>,
}

/// Apply `actions` on top of the branch's tree and commit the result.
///
/// On a branch with no start commit (an empty repository), the actions
/// are applied to the empty tree and the commit has no parents.
pub fn multi_file_commit(
    repo: &Repository,
    request: &MultiFileCommitRequest<'_>,
) -> Result<Option<BranchUpdate>, GitError> {
    let store = repo.store();
    BranchTransaction::new(repo).with_branch(
        request.branch_name,
        request.start_branch_name,
        |start| {
            let base = start.map(|commit| commit.oid.clone());
            let tree = store.apply_commit_actions(base.as_ref(), request.actions)?;

            let committer = CommitSignature::now(request.user.identity.clone());
            let author = request
                .author
                .map(|identity| CommitSignature::now(identity.clone()))
                .unwrap_or_else(|| committer.clone());

            let commit = store.create_commit(&CommitBlueprint {
                tree,
                parents: base.into_iter().collect(),
                author,
                committer,
                message: request.message.to_string(),
            })?;
            Ok(Some(commit))
        },
    )
}
