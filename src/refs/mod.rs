//! refs
//!
//! Transactional reference updates.
//!
//! # Strategies
//!
//! Two write paths exist, selectable per call:
//!
//! 1. **Batched** ([`RefTransaction::commit`]) - a NUL-delimited
//!    instruction stream submitted to `update-ref --stdin -z`. The whole
//!    batch applies atomically: if any instruction cannot be applied (for
//!    example a compare-and-swap expectation fails), none are.
//! 2. **Direct** ([`RefTransaction::write_ref_direct`]) - a forced write
//!    through the object-store binding. Two historical failure classes are
//!    swallowed into a status instead of an error: an unresolvable ref or
//!    target, and contention on the ref's lock file. Callers that need
//!    certainty must re-read the ref afterwards.
//!
//! # Validation
//!
//! Instruction names must not contain a space (the stdin protocol's field
//! separator) and targets must not contain NUL (the record separator).
//! Violations fail before any subprocess is spawned.

use tracing::warn;

use crate::core::types::{Oid, RefName};
use crate::git::shell::GitShell;
use crate::git::store::{ObjectStore, RefWriteError};
use crate::git::GitError;

/// One instruction in a batched ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdate {
    /// Create or update a ref. `old_target` makes the write conditional:
    /// the zero OID means "must not exist", any other value means "must
    /// currently equal this", absence means unconditional.
    Update {
        name: RefName,
        new_target: String,
        old_target: Option<String>,
    },
    /// Delete a ref, optionally only when it currently equals `old_target`.
    Delete {
        name: RefName,
        old_target: Option<String>,
    },
}

impl RefUpdate {
    /// Build a validated update instruction.
    pub fn update(
        name: &str,
        new_target: impl Into<String>,
        old_target: Option<String>,
    ) -> Result<Self, GitError> {
        let new_target = new_target.into();
        Self::validate_target(&new_target)?;
        if let Some(old) = &old_target {
            Self::validate_target(old)?;
        }
        Ok(RefUpdate::Update {
            name: RefName::new(name)?,
            new_target,
            old_target,
        })
    }

    /// Build a validated delete instruction.
    pub fn delete(name: &str, old_target: Option<String>) -> Result<Self, GitError> {
        if let Some(old) = &old_target {
            Self::validate_target(old)?;
        }
        Ok(RefUpdate::Delete {
            name: RefName::new(name)?,
            old_target,
        })
    }

    fn validate_target(target: &str) -> Result<(), GitError> {
        if target.contains('\0') {
            return Err(GitError::InvalidArgument(
                "ref target cannot contain NUL".into(),
            ));
        }
        Ok(())
    }

    fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RefUpdate::Update {
                name,
                new_target,
                old_target,
            } => {
                buf.extend_from_slice(b"update ");
                buf.extend_from_slice(name.as_str().as_bytes());
                buf.push(0);
                buf.extend_from_slice(new_target.as_bytes());
                buf.push(0);
                if let Some(old) = old_target {
                    buf.extend_from_slice(old.as_bytes());
                }
                buf.push(0);
            }
            RefUpdate::Delete { name, old_target } => {
                buf.extend_from_slice(b"delete ");
                buf.extend_from_slice(name.as_str().as_bytes());
                buf.push(0);
                if let Some(old) = old_target {
                    buf.extend_from_slice(old.as_bytes());
                }
                buf.push(0);
            }
        }
    }
}

/// Serialize a batch into the `update-ref --stdin -z` wire form.
pub(crate) fn serialize_instructions(updates: &[RefUpdate]) -> Vec<u8> {
    let mut buf = Vec::new();
    for update in updates {
        update.serialize_into(&mut buf);
    }
    buf
}

/// What happened to a direct (store-backed) ref write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRefOutcome {
    /// The ref now points at the requested target.
    Applied,
    /// The ref or its target could not be resolved; nothing was written.
    SkippedMissingRef,
    /// The ref's lock was held by someone else; nothing was written.
    SkippedLockContention,
}

impl WriteRefOutcome {
    /// Whether the write landed.
    pub fn applied(&self) -> bool {
        matches!(self, WriteRefOutcome::Applied)
    }
}

/// Atomic, optionally compare-and-swap, ref mutation.
pub struct RefTransaction<'a> {
    shell: &'a GitShell,
    store: &'a dyn ObjectStore,
}

impl<'a> RefTransaction<'a> {
    pub fn new(shell: &'a GitShell, store: &'a dyn ObjectStore) -> Self {
        Self { shell, store }
    }

    /// Apply a batch through `update-ref --stdin -z`. All instructions
    /// succeed or none do. An empty batch is a no-op.
    pub fn commit(&self, updates: &[RefUpdate]) -> Result<(), GitError> {
        if updates.is_empty() {
            return Ok(());
        }
        let input = serialize_instructions(updates);
        self.shell
            .git(["update-ref", "--stdin", "-z"])
            .stdin_bytes(input)
            .run_checked()?;
        Ok(())
    }

    /// Single-ref batched write.
    pub fn write_ref(
        &self,
        name: &str,
        new_target: impl Into<String>,
        old_target: Option<String>,
    ) -> Result<(), GitError> {
        self.commit(&[RefUpdate::update(name, new_target, old_target)?])
    }

    /// Forced write through the object-store binding.
    ///
    /// Unresolvable refs/targets and lock contention are reported as
    /// skipped outcomes rather than errors; everything else propagates.
    pub fn write_ref_direct(
        &self,
        name: &RefName,
        target: &Oid,
    ) -> Result<WriteRefOutcome, GitError> {
        match self.store.write_ref(name, target) {
            Ok(()) => Ok(WriteRefOutcome::Applied),
            Err(RefWriteError::InvalidName(msg)) | Err(RefWriteError::NotFound(msg)) => {
                warn!(ref_name = %name, %msg, "skipping unwritable ref");
                Ok(WriteRefOutcome::SkippedMissingRef)
            }
            Err(RefWriteError::LockContention(msg)) => {
                warn!(ref_name = %name, %msg, "skipping locked ref");
                Ok(WriteRefOutcome::SkippedLockContention)
            }
            Err(RefWriteError::Other(e)) => Err(e),
        }
    }
}
