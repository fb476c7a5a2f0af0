//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Git object identifier (SHA-1 or SHA-256 hex)
//! - [`RefName`] - Validated reference name
//! - [`WorktreeId`] - Caller-supplied identifier for an ephemeral worktree
//!
//! # Validation
//!
//! These types enforce validity at construction time. Values that would be
//! rejected by the plumbing commands they are eventually handed to cannot be
//! represented, so validation failures surface before any subprocess is
//! spawned.
//!
//! # Examples
//!
//! ```
//! use capstan::core::types::{Oid, RefName, WorktreeId};
//!
//! let oid = Oid::new("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap();
//! assert_eq!(oid.short(7), "4b825dc");
//!
//! let name = RefName::new("refs/heads/main").unwrap();
//! assert_eq!(name.as_str(), "refs/heads/main");
//!
//! assert!(WorktreeId::new("has/slash").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid worktree id: {0}")]
    InvalidWorktreeId(String),
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase at construction.
///
/// # Example
///
/// ```
/// use capstan::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
///
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    const ZERO_SHA1: &'static str = "0000000000000000000000000000000000000000";

    /// The id of the empty tree object. Every repository contains it,
    /// whether or not any commit references it.
    pub const EMPTY_TREE: &'static str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    /// Create a new validated object id, normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 or 64 hex
    /// characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid("non-hex character".into()));
        }
        Ok(Self(oid))
    }

    /// The zero/null OID (40 zeros), used as the "no such object" sentinel
    /// in ref transactions and diff output.
    pub fn zero() -> Self {
        Self(Self::ZERO_SHA1.to_string())
    }

    /// The empty-tree OID as a typed value.
    pub fn empty_tree() -> Self {
        Self(Self::EMPTY_TREE.to_string())
    }

    /// Check if this is the zero/null OID.
    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    /// Get the OID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form: the first `len` characters (or the full OID when
    /// `len` exceeds its length).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git reference name.
///
/// The rules here are the subset that matters for handing names to
/// `update-ref --stdin -z` and the object-store binding:
///
/// - Cannot be empty
/// - Cannot contain a space (the stdin protocol's field separator)
/// - Cannot contain a NUL byte or other ASCII control characters
/// - Cannot start with `-` (would parse as an option)
/// - Cannot contain `..`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates the rules
    /// above.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// The branch ref for a simple branch name, e.g. `main` ->
    /// `refs/heads/main`.
    pub fn for_branch(branch: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/heads/{branch}"))
    }

    /// The tag ref for a simple tag name.
    pub fn for_tag(tag: &str) -> Result<Self, TypeError> {
        Self::new(format!("refs/tags/{tag}"))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidRefName("ref name cannot be empty".into()));
        }
        if name.contains(' ') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot contain a space".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot start with '-'".into(),
            ));
        }
        if name.contains("..") {
            return Err(TypeError::InvalidRefName(
                "ref name cannot contain '..'".into(),
            ));
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidRefName(
                "ref name cannot contain control characters".into(),
            ));
        }
        Ok(())
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller-supplied identifier naming one ephemeral worktree.
///
/// The id becomes the suffix of an on-disk directory name, so it must be
/// non-empty and must not contain a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorktreeId(String);

impl WorktreeId {
    /// Create a new validated worktree id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidWorktreeId(
                "worktree id cannot be empty".into(),
            ));
        }
        if id.contains('/') || id.contains('\\') {
            return Err(TypeError::InvalidWorktreeId(
                "worktree id cannot contain a path separator".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorktreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod oid {
        use super::*;

        #[test]
        fn accepts_sha1_and_sha256_lengths() {
            assert!(Oid::new("a".repeat(40)).is_ok());
            assert!(Oid::new("a".repeat(64)).is_ok());
            assert!(Oid::new("a".repeat(39)).is_err());
            assert!(Oid::new("a".repeat(41)).is_err());
        }

        #[test]
        fn rejects_non_hex() {
            assert!(Oid::new("g".repeat(40)).is_err());
        }

        #[test]
        fn normalizes_to_lowercase() {
            let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").expect("valid oid");
            assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn zero_is_zero() {
            assert!(Oid::zero().is_zero());
            assert!(!Oid::empty_tree().is_zero());
        }

        #[test]
        fn short_clamps_to_length() {
            let oid = Oid::empty_tree();
            assert_eq!(oid.short(7), "4b825dc");
            assert_eq!(oid.short(100), Oid::EMPTY_TREE);
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn accepts_common_refs() {
            assert!(RefName::new("refs/heads/main").is_ok());
            assert!(RefName::new("refs/tags/v1.0").is_ok());
            assert!(RefName::new("HEAD").is_ok());
            assert!(RefName::new("refs/tmp/5f2a").is_ok());
        }

        #[test]
        fn rejects_space() {
            assert!(RefName::new("refs/heads/with space").is_err());
        }

        #[test]
        fn rejects_empty_and_dashes_and_dotdot() {
            assert!(RefName::new("").is_err());
            assert!(RefName::new("-ref").is_err());
            assert!(RefName::new("refs/heads/a..b").is_err());
        }

        #[test]
        fn rejects_control_characters() {
            assert!(RefName::new("refs/heads/a\x00b").is_err());
            assert!(RefName::new("refs/heads/a\nb").is_err());
        }

        #[test]
        fn branch_and_tag_helpers() {
            assert_eq!(
                RefName::for_branch("main").expect("valid").as_str(),
                "refs/heads/main"
            );
            assert_eq!(
                RefName::for_tag("v1.0").expect("valid").as_str(),
                "refs/tags/v1.0"
            );
        }
    }

    mod worktree_id {
        use super::*;

        #[test]
        fn accepts_simple_ids() {
            assert!(WorktreeId::new("42").is_ok());
            assert!(WorktreeId::new("rebase-abc123").is_ok());
        }

        #[test]
        fn rejects_empty() {
            assert!(WorktreeId::new("").is_err());
        }

        #[test]
        fn rejects_path_separators() {
            assert!(WorktreeId::new("a/b").is_err());
            assert!(WorktreeId::new("a\\b").is_err());
        }
    }
}
