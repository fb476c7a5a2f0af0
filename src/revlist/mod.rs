//! revlist
//!
//! Streaming object-graph traversal.
//!
//! A [`Traversal`] wraps one `rev-list` child process and yields object
//! ids as they arrive on the pipe; the full output is never materialized
//! here. Each traversal is finite and not restartable: a new invocation
//! spawns a fresh process, and dropping a traversal mid-stream kills its
//! child.

pub mod lfs;

use std::io::{BufRead, BufReader, Lines};
use std::process::{Child, ChildStdout};

use crate::core::types::Oid;
use crate::git::shell::GitShell;
use crate::git::GitError;

/// The starting set of a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevSpec {
    /// Everything reachable from every ref.
    All,
    /// The given refs/revisions.
    Revisions(Vec<String>),
}

/// One traversal request.
#[derive(Debug, Clone)]
pub struct RevListQuery {
    pub including: RevSpec,
    /// Passed as a `--not` clause after the included set, when non-empty.
    pub excluding: Vec<String>,
    /// Extra raw options appended verbatim (ordering, filters).
    pub options: Vec<String>,
    /// Emit all reachable objects, not just commits.
    pub objects: bool,
    /// Keep only output lines that carry an associated path.
    pub require_path: bool,
}

impl RevListQuery {
    /// Everything reachable from one revision.
    pub fn reachable_from(rev: impl Into<String>) -> Self {
        Self {
            including: RevSpec::Revisions(vec![rev.into()]),
            excluding: Vec::new(),
            options: Vec::new(),
            objects: false,
            require_path: false,
        }
    }

    /// Everything reachable from every ref.
    pub fn all() -> Self {
        Self {
            including: RevSpec::All,
            excluding: Vec::new(),
            options: Vec::new(),
            objects: false,
            require_path: false,
        }
    }

    pub fn excluding(mut self, revs: Vec<String>) -> Self {
        self.excluding = revs;
        self
    }

    pub fn objects(mut self, objects: bool) -> Self {
        self.objects = objects;
        self
    }

    pub fn require_path(mut self, require_path: bool) -> Self {
        self.require_path = require_path;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

/// Argument order is significant: included set, `--not` clause,
/// `--objects`, then caller options.
pub(crate) fn build_args(query: &RevListQuery) -> Vec<String> {
    let mut args = vec!["rev-list".to_string()];
    match &query.including {
        RevSpec::All => args.push("--all".to_string()),
        RevSpec::Revisions(revs) => args.extend(revs.iter().cloned()),
    }
    if !query.excluding.is_empty() {
        args.push("--not".to_string());
        args.extend(query.excluding.iter().cloned());
    }
    if query.objects {
        args.push("--objects".to_string());
    }
    args.extend(query.options.iter().cloned());
    args
}

/// One line of traversal output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ObjectEntry {
    pub oid: Oid,
    pub path: Option<String>,
}

/// A running traversal. Iterate to drain it; the child's exit status is
/// checked when the stream ends, surfacing a failed traversal as the final
/// item.
pub struct Traversal {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<std::thread::JoinHandle<Vec<u8>>>,
    require_path: bool,
    context: String,
    finished: bool,
}

pub(crate) fn spawn(shell: &GitShell, query: &RevListQuery) -> Result<Traversal, GitError> {
    let args = build_args(query);
    let invocation = shell.git(&args);
    let context = invocation.context();
    let mut child = invocation.spawn_piped(false)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GitError::Store("rev-list process has no stdout".into()))?;
    let stderr = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    Ok(Traversal {
        child,
        lines: BufReader::new(stdout).lines(),
        stderr,
        require_path: query.require_path,
        context,
        finished: false,
    })
}

impl Traversal {
    /// Drain the stream into fixed-size batches handed to `consumer`.
    pub fn for_each_batch<F>(mut self, batch_size: usize, mut consumer: F) -> Result<(), GitError>
    where
        F: FnMut(Vec<ObjectEntry>) -> Result<(), GitError>,
    {
        let mut batch = Vec::with_capacity(batch_size.min(1024));
        for entry in &mut self {
            batch.push(entry?);
            if batch.len() >= batch_size {
                consumer(std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            consumer(batch)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Option<Result<ObjectEntry, GitError>> {
        self.finished = true;
        let status = match self.child.wait() {
            Ok(status) => status,
            Err(e) => return Some(Err(e.into())),
        };
        if status.success() {
            return None;
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Some(Err(GitError::Command {
            context: self.context.clone(),
            output: String::from_utf8_lossy(&stderr).into_owned(),
        }))
    }

    fn parse_line(&self, line: &str) -> Option<Result<ObjectEntry, GitError>> {
        let (oid, path) = match line.split_once(' ') {
            Some((oid, path)) if !path.is_empty() => (oid, Some(path.to_string())),
            Some((oid, _)) => (oid, None),
            None => (line, None),
        };
        if self.require_path && path.is_none() {
            return None;
        }
        match Oid::new(oid) {
            Ok(oid) => Some(Ok(ObjectEntry { oid, path })),
            // Interleaved notices ("commit <oid> missing") are not object
            // lines; skip them.
            Err(_) => None,
        }
    }
}

impl Iterator for Traversal {
    type Item = Result<ObjectEntry, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(entry) = self.parse_line(&line) {
                        return Some(entry);
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => return self.finish(),
            }
        }
    }
}

impl Drop for Traversal {
    fn drop(&mut self) {
        // An abandoned traversal must not leave its child running.
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Batch size used by derived traversals.
pub(crate) const DEFAULT_BATCH_SIZE: usize = 1000;
