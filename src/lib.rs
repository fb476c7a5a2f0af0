//! Capstan - repository operations over a bare git object store
//!
//! Capstan sits directly on top of a bare object store and exposes
//! high-level repository operations - branch and tag CRUD, three-way
//! merge, cherry-pick, revert, rebase, squash, multi-file commit, diff
//! extraction, and object-graph traversal - by combining direct object
//! database manipulation with plumbing commands connected through
//! process pipes.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (read-only inspection)
//! - [`repo`] - The repository façade composing everything below
//! - [`ops`] - Mutating workflows (merge, pick, rebase, squash, commit)
//! - [`refs`] - Transactional reference updates
//! - [`diff`] - Raw-diff parsing and the paired-process change stream
//! - [`revlist`] - Streaming object-graph traversal and LFS discovery
//! - [`worktree`] - Ephemeral worktrees with guaranteed cleanup
//! - [`git`] - Error taxonomy, subprocess shell, object-store seam
//! - [`core`] - Domain types, identity, versioning, configuration
//!
//! # Correctness Invariants
//!
//! 1. Argument validation happens before any subprocess is spawned
//! 2. Every ref mutation flows through the ref transaction
//! 3. Worktrees are removed on every exit path
//! 4. Batched ref updates apply atomically or not at all

pub mod cli;
pub mod core;
pub mod diff;
pub mod git;
pub mod ops;
pub mod refs;
pub mod repo;
pub mod revlist;
pub mod worktree;
