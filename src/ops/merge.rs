//! ops::merge
//!
//! Index-based three-way merge of a source commit into a target branch.

use crate::core::identity::ActingUser;
use crate::core::types::Oid;
use crate::git::store::{CommitBlueprint, CommitSignature, ThreeWayResult};
use crate::git::GitError;
use crate::ops::{BranchTransaction, BranchUpdate};
use crate::repo::Repository;

/// Merge `source` into `target_branch`.
///
/// Returns `Ok(None)` when the merge conflicts: no tree was produced and
/// nothing was written, but that is a normal outcome, not an error. The
/// merge commit carries both parents (target first) and the acting user
/// as author and committer.
pub fn merge(
    repo: &Repository,
    user: &ActingUser,
    source: &Oid,
    target_branch: &str,
    message: &str,
) -> Result<Option<BranchUpdate>, GitError> {
    let store = repo.store();
    BranchTransaction::new(repo).with_branch(target_branch, None, |start| {
        let start = start.ok_or_else(|| {
            GitError::InvalidRef(format!("invalid merge target: {target_branch}"))
        })?;
        store
            .resolve_commit(source.as_str())?
            .ok_or_else(|| GitError::InvalidRef(format!("invalid merge source: {source}")))?;

        let tree = match store.merge_commits(&start.oid, source)? {
            ThreeWayResult::Conflict => return Ok(None),
            ThreeWayResult::Tree(tree) => tree,
        };

        let signature = CommitSignature::now(user.identity.clone());
        let commit = store.create_commit(&CommitBlueprint {
            tree,
            parents: vec![start.oid.clone(), source.clone()],
            author: signature.clone(),
            committer: signature,
            message: message.to_string(),
        })?;
        Ok(Some(commit))
    })
}

/// Fast-forward `target_branch` to `source`.
///
/// `source` must already contain the branch tip; anything else is an
/// argument error, since a fast-forward by definition creates no commit.
pub fn ff_merge(
    repo: &Repository,
    _user: &ActingUser,
    source: &Oid,
    target_branch: &str,
) -> Result<BranchUpdate, GitError> {
    let store = repo.store();
    let update = BranchTransaction::new(repo).with_branch(target_branch, None, |start| {
        let start = start.ok_or_else(|| {
            GitError::InvalidArgument(format!("invalid merge target: {target_branch}"))
        })?;
        store
            .resolve_commit(source.as_str())?
            .ok_or_else(|| GitError::InvalidArgument(format!("invalid merge source: {source}")))?;
        if !store.is_ancestor(&start.oid, source)? {
            return Err(GitError::InvalidArgument(format!(
                "{source} is not a fast-forward of {target_branch}"
            )));
        }
        Ok(Some(source.clone()))
    })?;
    update.ok_or_else(|| GitError::Store("fast-forward produced no update".into()))
}
