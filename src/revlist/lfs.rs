//! revlist::lfs
//!
//! Discovery of Large-File-Storage pointer objects reachable from a
//! revision.
//!
//! Pointer blobs are tiny; the traversal only surfaces candidate object
//! ids, and a caller-supplied [`PointerResolver`] turns batches of ids
//! into actual pointer records. Two git capabilities improve the scan and
//! are gated on the detected tool version (2.16.0 or later):
//!
//! - `--in-commit-order` lets consumers see pointers before the whole
//!   graph has been walked;
//! - `--filter=blob:limit=<n>` drops oversized blobs on the producing
//!   side, so their contents never cross the pipe.

use crate::core::types::Oid;
use crate::core::version::GitVersion;
use crate::git::GitError;
use crate::repo::Repository;
use crate::revlist::{RevListQuery, DEFAULT_BATCH_SIZE};

/// Upper bound on the size of a valid pointer blob, in bytes.
pub const LFS_POINTER_MAX_SIZE: usize = 200;

/// A resolved pointer blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfsPointer {
    pub oid: Oid,
    pub size: u64,
    pub data: Vec<u8>,
}

/// Turns candidate blob ids into pointer records, dropping ids that are
/// not pointers. Implemented by the blob-batching collaborator.
pub trait PointerResolver {
    fn batch_pointers(&self, oids: &[Oid]) -> Result<Vec<LfsPointer>, GitError>;
}

/// Pointer discovery for one target revision.
pub struct LfsChanges<'a> {
    repo: &'a Repository,
    newrev: String,
}

impl<'a> LfsChanges<'a> {
    pub fn new(repo: &'a Repository, newrev: impl Into<String>) -> Self {
        Self {
            repo,
            newrev: newrev.into(),
        }
    }

    /// Pointers newly reachable from the target revision, excluding
    /// anything reachable from the `not_in` baseline, optionally capped
    /// at `object_limit` candidates. Without a baseline everything
    /// already reachable from any ref is excluded - the shape of a
    /// pre-receive check, where the target revision is not yet
    /// referenced.
    pub fn new_pointers(
        &self,
        object_limit: Option<usize>,
        not_in: Option<&[String]>,
        resolver: &dyn PointerResolver,
    ) -> Result<Vec<LfsPointer>, GitError> {
        let excluding = match not_in {
            Some(revs) => revs.to_vec(),
            None => vec!["--all".to_string()],
        };
        let mut query = RevListQuery::reachable_from(&self.newrev)
            .excluding(excluding)
            .objects(true)
            .require_path(true);
        if self.modern_traversal()? {
            query = query.with_options(vec!["--in-commit-order".to_string()]);
        }
        self.resolve(query, object_limit, resolver)
    }

    /// Every pointer reachable from the target revision. A server-side
    /// blob-size filter keeps oversized blob contents from crossing the
    /// traversal boundary when the tool supports it.
    pub fn all_pointers(
        &self,
        resolver: &dyn PointerResolver,
    ) -> Result<Vec<LfsPointer>, GitError> {
        let mut query = RevListQuery::reachable_from(&self.newrev)
            .objects(true)
            .require_path(true);
        if self.modern_traversal()? {
            query = query.with_options(vec![format!("--filter=blob:limit={LFS_POINTER_MAX_SIZE}")]);
        }
        self.resolve(query, None, resolver)
    }

    fn resolve(
        &self,
        query: RevListQuery,
        object_limit: Option<usize>,
        resolver: &dyn PointerResolver,
    ) -> Result<Vec<LfsPointer>, GitError> {
        let traversal = self.repo.rev_list(&query)?;
        let mut pointers = Vec::new();
        let mut seen = 0usize;
        let mut batch = Vec::with_capacity(DEFAULT_BATCH_SIZE);

        for entry in traversal {
            if let Some(limit) = object_limit {
                if seen >= limit {
                    break;
                }
            }
            let entry = entry?;
            seen += 1;
            batch.push(entry.oid);
            if batch.len() >= DEFAULT_BATCH_SIZE {
                pointers.extend(resolver.batch_pointers(&batch)?);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            pointers.extend(resolver.batch_pointers(&batch)?);
        }
        Ok(pointers)
    }

    fn modern_traversal(&self) -> Result<bool, GitError> {
        Ok(self.repo.git_version()? >= GitVersion::new(2, 16, 0))
    }
}
