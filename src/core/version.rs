//! core::version
//!
//! Parsing and comparison of the installed git tool version.
//!
//! Some traversal options (`--in-commit-order`, `--filter=blob:limit=<n>`)
//! only exist in git 2.16.0 and later, so callers probe the binary once and
//! gate those flags on the result.

use thiserror::Error;

/// Errors from version detection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("unrecognized git version output: {0:?}")]
    Unrecognized(String),
}

/// A parsed `git version` triple.
///
/// Pre-release suffixes (`2.16.0-rc0`) are ignored; missing components
/// default to zero.
///
/// # Example
///
/// ```
/// use capstan::core::version::GitVersion;
///
/// let v = GitVersion::parse("git version 2.39.1").unwrap();
/// assert!(v >= GitVersion::new(2, 16, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Construct a version triple directly.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `git version`.
    ///
    /// Accepts either the full `git version X.Y.Z` banner or a bare
    /// `X.Y.Z` string.
    pub fn parse(output: &str) -> Result<Self, VersionError> {
        let raw = output
            .trim()
            .strip_prefix("git version ")
            .unwrap_or_else(|| output.trim());

        // "2.39.1", "2.16.0-rc0", "2.48.1.windows.1" all start with the
        // numeric triple.
        let mut parts = raw.split('.');
        let major = Self::numeric_component(parts.next())
            .ok_or_else(|| VersionError::Unrecognized(output.to_string()))?;
        let minor = Self::numeric_component(parts.next()).unwrap_or(0);
        let patch = Self::numeric_component(parts.next()).unwrap_or(0);

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    fn numeric_component(part: Option<&str>) -> Option<u32> {
        let digits: String = part?.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

impl std::fmt::Display for GitVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
