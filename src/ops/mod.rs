//! ops
//!
//! The mutating workflows: merge, cherry-pick, revert, rebase, squash,
//! and multi-file commit.
//!
//! # Shared shape
//!
//! Every workflow follows the same state machine: resolve the target,
//! compute or obtain a result, bail out on conflict, finalize the ref.
//! Resolution and finalization are owned by [`BranchTransaction`]; the
//! finalizing write always goes through
//! [`RefTransaction`](crate::refs::RefTransaction) with the resolved
//! start as its compare-and-swap expectation, so a branch that moved
//! underneath the workflow fails the whole operation instead of losing
//! the concurrent update. No workflow retries on its own.

pub mod actions;
pub mod merge;
pub mod pick;
pub mod rebase;
pub mod squash;

use crate::core::types::{Oid, RefName};
use crate::git::store::CommitSnapshot;
use crate::git::GitError;
use crate::refs::RefTransaction;
use crate::repo::Repository;

/// A finalized branch mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchUpdate {
    pub newrev: Oid,
    pub branch_created: bool,
}

/// Resolves a start commit for a target branch, runs a workflow body, and
/// finalizes the branch ref against the resolved start.
pub(crate) struct BranchTransaction<'a> {
    repo: &'a Repository,
}

impl<'a> BranchTransaction<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Run `body` against the start commit of `branch_name` (or of
    /// `start_branch_name` when supplied, e.g. when creating a new branch
    /// off another one).
    ///
    /// `body` returns the new revision for the branch, or `None` to abort
    /// without error; in that case nothing is written and `Ok(None)` is
    /// returned. On finalization the branch must still be where it was
    /// resolved (or still absent, for a new branch) - the write is
    /// compare-and-swap through the batched ref transaction.
    pub fn with_branch<F>(
        &self,
        branch_name: &str,
        start_branch_name: Option<&str>,
        body: F,
    ) -> Result<Option<BranchUpdate>, GitError>
    where
        F: FnOnce(Option<&CommitSnapshot>) -> Result<Option<Oid>, GitError>,
    {
        let branch_ref = RefName::for_branch(branch_name)?;
        let store = self.repo.store();

        let current_target = store.resolve(branch_ref.as_str())?;

        let start_spec = match start_branch_name {
            Some(start) => format!("refs/heads/{start}"),
            None => branch_ref.as_str().to_string(),
        };
        let start_commit = store.resolve_commit(&start_spec)?;

        let Some(newrev) = body(start_commit.as_ref())? else {
            return Ok(None);
        };

        // Absent branch: the zero old value makes creation fail if someone
        // else created the ref in the meantime.
        let expected_old = current_target
            .as_ref()
            .map(|oid| oid.to_string())
            .unwrap_or_else(|| Oid::zero().to_string());

        RefTransaction::new(self.repo.shell(), store).write_ref(
            branch_ref.as_str(),
            newrev.as_str(),
            Some(expected_old),
        )?;

        Ok(Some(BranchUpdate {
            newrev,
            branch_created: current_target.is_none(),
        }))
    }
}
