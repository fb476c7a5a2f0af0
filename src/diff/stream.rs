//! diff::stream
//!
//! Pairing of a raw-diff producer with a batch object-metadata process.
//!
//! # Architecture
//!
//! Two children run concurrently, connected to us by pipes:
//!
//! - `git diff <old> <new> --raw` produces one line per change;
//! - `git cat-file --batch-check=%(objectname) %(objectsize) %(rest)`
//!   answers one metadata line per query line.
//!
//! For every raw line we pick the blob to ask about (the old blob for
//! deletions, since the metadata process cannot describe the all-zero id),
//! submit `<blobId> <rest>` to the metadata process, and pair its answer
//! with the raw line's file modes to build a [`RawDiffChange`].
//!
//! A dedicated thread drains the metadata process's stdout into a bounded
//! channel while the main loop feeds its stdin, so neither pipe can fill
//! up and deadlock the pair regardless of volume.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::Child;
use std::sync::mpsc::sync_channel;
use std::thread;

use crate::core::types::Oid;
use crate::diff::RawDiffChange;
use crate::git::shell::GitShell;
use crate::git::GitError;

/// Capacity of the metadata-response channel. Bounded so an unexpectedly
/// chatty child applies backpressure instead of growing the heap.
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// Compute the change records between two revisions.
///
/// An empty or all-zero `new_rev` yields an empty list without spawning
/// anything; an all-zero `old_rev` is replaced by the well-known empty
/// tree so additions against a new ref still resolve.
pub(crate) fn raw_changes_between(
    shell: &GitShell,
    old_rev: &str,
    new_rev: &str,
) -> Result<Vec<RawDiffChange>, GitError> {
    if new_rev.is_empty() || is_all_zero(new_rev) {
        return Ok(Vec::new());
    }
    let old_rev_effective = if is_all_zero(old_rev) {
        Oid::EMPTY_TREE
    } else {
        old_rev
    };

    let context = || format!("could not obtain changes between {old_rev} and {new_rev}");

    let mut diff_child = shell
        .git(["diff", old_rev_effective, new_rev, "--raw"])
        .spawn_piped(false)?;
    let mut cat_child = shell
        .git(["cat-file", "--batch-check=%(objectname) %(objectsize) %(rest)"])
        .spawn_piped(true)?;

    let result = pump(&mut diff_child, &mut cat_child);

    // Both children must have exited cleanly, even when pumping failed;
    // reap them either way so nothing is left behind.
    let diff_status = diff_child.wait()?;
    let cat_status = cat_child.wait()?;

    let changes = result?;

    if !diff_status.success() || !cat_status.success() {
        return Err(GitError::Command {
            context: context(),
            output: format!(
                "diff exited {diff_status}, metadata lookup exited {cat_status}"
            ),
        });
    }

    Ok(changes)
}

fn pump(diff_child: &mut Child, cat_child: &mut Child) -> Result<Vec<RawDiffChange>, GitError> {
    let diff_stdout = diff_child
        .stdout
        .take()
        .ok_or_else(|| GitError::Store("diff process has no stdout".into()))?;
    let mut cat_stdin = cat_child
        .stdin
        .take()
        .ok_or_else(|| GitError::Store("metadata process has no stdin".into()))?;
    let cat_stdout = cat_child
        .stdout
        .take()
        .ok_or_else(|| GitError::Store("metadata process has no stdout".into()))?;

    // Stderr of both children is drained in the background so an error
    // tirade cannot block either child.
    let _diff_stderr = drain_quietly(diff_child.stderr.take());
    let _cat_stderr = drain_quietly(cat_child.stderr.take());

    let (tx, rx) = sync_channel::<std::io::Result<String>>(RESPONSE_CHANNEL_CAPACITY);
    let reader = thread::spawn(move || {
        for line in BufReader::new(cat_stdout).lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });

    let mut changes = Vec::new();
    let mut pending: VecDeque<(String, String)> = VecDeque::new();

    let feed_result = (|| -> Result<(), GitError> {
        for line in BufReader::new(diff_stdout).lines() {
            let line = line?;
            let parsed = parse_raw_diff_line(&line)?;
            writeln!(cat_stdin, "{} {}", parsed.blob_id, parsed.rest)?;
            pending.push_back((parsed.old_mode, parsed.new_mode));

            // Opportunistically drain answers that are already available,
            // keeping the response pipe from backing up on large diffs.
            while let Ok(response) = rx.try_recv() {
                pair_response(&mut changes, &mut pending, response?)?;
            }
        }
        Ok(())
    })();

    // Closing the query side tells the metadata process to finish.
    drop(cat_stdin);

    let drain_result = (|| -> Result<(), GitError> {
        while !pending.is_empty() {
            match rx.recv() {
                Ok(response) => pair_response(&mut changes, &mut pending, response?)?,
                Err(_) => {
                    return Err(GitError::Store(
                        "metadata process ended before answering all queries".into(),
                    ))
                }
            }
        }
        Ok(())
    })();

    let _ = reader.join();

    feed_result?;
    drain_result?;
    Ok(changes)
}

fn pair_response(
    changes: &mut Vec<RawDiffChange>,
    pending: &mut VecDeque<(String, String)>,
    response: String,
) -> Result<(), GitError> {
    let (old_mode, new_mode) = pending.pop_front().ok_or_else(|| {
        GitError::Store("metadata process answered more queries than were sent".into())
    })?;
    changes.push(RawDiffChange::parse(&response, old_mode, new_mode));
    Ok(())
}

fn drain_quietly(pipe: Option<impl Read + Send + 'static>) -> Option<thread::JoinHandle<()>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut sink = Vec::new();
            let _ = pipe.read_to_end(&mut sink);
        })
    })
}

fn is_all_zero(rev: &str) -> bool {
    !rev.is_empty() && rev.chars().all(|c| c == '0')
}

/// The pieces of one raw diff line that matter downstream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedRawLine {
    pub old_mode: String,
    pub new_mode: String,
    /// The blob to query: the new blob, or the old one for deletions.
    pub blob_id: String,
    /// The status-and-paths tail, echoed through the metadata process.
    pub rest: String,
}

/// Split `:100644 100644 <oldBlob> <newBlob> <status>\t<paths...>`.
///
/// A line without the path-bearing tail is a protocol violation.
pub(crate) fn parse_raw_diff_line(line: &str) -> Result<ParsedRawLine, GitError> {
    let mut parts = line.splitn(5, [' ', '\t']);
    let old_mode = parts.next().unwrap_or_default();
    let new_mode = parts.next().unwrap_or_default();
    let old_blob = parts.next().unwrap_or_default();
    let new_blob = parts.next().unwrap_or_default();
    let rest = parts
        .next()
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| GitError::InvalidArgument(format!("invalid diff line: {line}")))?;

    let old_mode = old_mode.strip_prefix(':').unwrap_or(old_mode);
    let old_blob: String = old_blob.chars().filter(char::is_ascii_hexdigit).collect();
    let new_blob: String = new_blob.chars().filter(char::is_ascii_hexdigit).collect();

    // The metadata process cannot describe the all-zero id a deletion
    // carries as its new blob; ask about the old blob instead.
    let blob_id = if is_all_zero(&new_blob) {
        old_blob
    } else {
        new_blob
    };

    Ok(ParsedRawLine {
        old_mode: old_mode.to_string(),
        new_mode: new_mode.to_string(),
        blob_id,
        rest: rest.to_string(),
    })
}
