//! cli::args
//!
//! Command-line argument definitions using clap derive.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Capstan - repository operations over a bare git object store
#[derive(Parser, Debug)]
#[command(name = "capstan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the repository (its git directory)
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Storage name of the repository
    #[arg(long, global = true, default_value = "default")]
    pub storage: String,

    /// Relative path identifying the repository within its storage;
    /// derived from --repo when omitted
    #[arg(long, global = true)]
    pub relative_path: Option<String>,

    /// Configuration file (overrides the standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// The repository's relative path, defaulting to the last component
    /// of `--repo`.
    pub fn relative_path(&self) -> String {
        match &self.relative_path {
            Some(path) => path.clone(),
            None => self
                .repo
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| ".".to_string()),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Integrity-check the object database
    Fsck,

    /// List local branch names
    Branches,

    /// List tag names
    Tags,

    /// List commit ids from a log walk
    Log {
        /// Revision to walk from (HEAD when omitted)
        #[arg(long)]
        ref_name: Option<String>,

        /// Walk every ref, oldest first
        #[arg(long)]
        all: bool,

        /// Maximum number of commits
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Commits to skip before emitting
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Leave out merge commits
        #[arg(long)]
        skip_merges: bool,

        /// Restrict to these paths
        #[arg(last = true)]
        paths: Vec<String>,
    },

    /// Structured change records between two revisions, as JSON lines
    RawChanges {
        /// Old revision (all zeros for the empty tree)
        old_rev: String,
        /// New revision
        new_rev: String,
    },

    /// Stream object ids from a graph traversal, as JSON lines
    RevList {
        /// Revisions to start from
        revisions: Vec<String>,

        /// Traverse from every ref instead of explicit revisions
        #[arg(long, conflicts_with = "revisions")]
        all: bool,

        /// Exclude everything reachable from these revisions
        #[arg(long)]
        not: Vec<String>,

        /// Emit all objects, not just commits
        #[arg(long)]
        objects: bool,
    },

    /// Print the repository checksum
    Checksum,

    /// Resolve a revision to an object id
    Lookup {
        /// Revision to resolve
        revspec: String,
    },

    /// Check whether one commit is an ancestor of another
    Ancestor {
        /// Candidate ancestor object id
        from: String,
        /// Descendant object id
        to: String,
    },
}
