//! core
//!
//! Core domain types and configuration for the git layer.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, WorktreeId
//! - [`identity`] - The acting user behind a mutating operation
//! - [`version`] - Git tool version detection
//! - [`config`] - Tool configuration, injected at construction
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Validation happens before any subprocess is spawned
//! - Configuration is injected, never read from process-wide state

pub mod config;
pub mod identity;
pub mod types;
pub mod version;
