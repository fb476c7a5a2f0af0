//! diff
//!
//! Structured change records extracted from raw diff output.
//!
//! [`RawDiffChange`] decodes one line of resolved raw-diff output (see
//! [`stream`]); the parser is pure and deliberately lenient, because the
//! producing plumbing is trusted: unrecognized status codes become
//! [`ChangeOperation::Unknown`] and a non-numeric size parses to zero
//! rather than failing the whole stream.

pub mod stream;

use serde::Serialize;

/// What happened to a file in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unknown,
}

impl ChangeOperation {
    fn from_status(status: Option<&str>) -> Self {
        match status.and_then(|s| s.chars().next()) {
            Some('A') => ChangeOperation::Added,
            Some('C') => ChangeOperation::Copied,
            Some('D') => ChangeOperation::Deleted,
            Some('M') => ChangeOperation::Modified,
            Some('R') => ChangeOperation::Renamed,
            Some('T') => ChangeOperation::TypeChanged,
            _ => ChangeOperation::Unknown,
        }
    }
}

/// One decoded change record.
///
/// Path presence depends on the operation: deletions have no new path,
/// additions no old path, copies and renames carry both (distinct), and
/// everything else carries the same path twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDiffChange {
    pub blob_id: String,
    pub blob_size: u64,
    pub operation: ChangeOperation,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub old_mode: String,
    pub new_mode: String,
}

impl RawDiffChange {
    /// Decode one resolved line plus the two file modes from the raw diff
    /// line it originated from.
    ///
    /// Input shapes:
    ///
    /// ```text
    /// <blobId> <blobSize> <status>\t<path>
    /// <blobId> <blobSize> <status><score>\t<oldPath>\t<newPath>
    /// ```
    pub fn parse(raw: &str, old_mode: impl Into<String>, new_mode: impl Into<String>) -> Self {
        let mut rest = raw;
        let blob_id = next_field(&mut rest).unwrap_or_default().to_string();
        let blob_size = lenient_size(next_field(&mut rest).unwrap_or_default());
        let status = next_field(&mut rest);
        let operation = ChangeOperation::from_status(status);
        let raw_paths = next_remainder(&mut rest);
        let (old_path, new_path) = extract_paths(operation, raw_paths);

        Self {
            blob_id,
            blob_size,
            operation,
            old_path,
            new_path,
            old_mode: old_mode.into(),
            new_mode: new_mode.into(),
        }
    }
}

/// Take the next whitespace-delimited field, consuming leading whitespace.
fn next_field<'a>(s: &mut &'a str) -> Option<&'a str> {
    *s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if s.is_empty() {
        return None;
    }
    match s.find(|c: char| c.is_ascii_whitespace()) {
        Some(i) => {
            let (field, rest) = s.split_at(i);
            *s = rest;
            Some(field)
        }
        None => {
            let field = *s;
            *s = "";
            Some(field)
        }
    }
}

/// Take everything after the current position as one field, trimming the
/// separator run in front of it and the trailing newline.
fn next_remainder<'a>(s: &mut &'a str) -> Option<&'a str> {
    let rest = s
        .trim_start_matches(|c: char| c.is_ascii_whitespace())
        .trim_end_matches(['\n', '\r']);
    *s = "";
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// `"669"` -> 669, `"missing"` -> 0, `"12kb"` -> 12.
fn lenient_size(field: &str) -> u64 {
    let digits: String = field.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn extract_paths(
    operation: ChangeOperation,
    raw_paths: Option<&str>,
) -> (Option<String>, Option<String>) {
    let Some(raw) = raw_paths else {
        return (None, None);
    };
    match operation {
        ChangeOperation::Copied | ChangeOperation::Renamed => {
            let mut parts = raw.split('\t');
            let old = parts.next().map(str::to_string);
            let new = parts.next().map(str::to_string);
            (old, new)
        }
        ChangeOperation::Deleted => (Some(raw.to_string()), None),
        ChangeOperation::Added => (None, Some(raw.to_string())),
        _ => (Some(raw.to_string()), Some(raw.to_string())),
    }
}
