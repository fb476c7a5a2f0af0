//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse arguments and global flags
//! - Open a [`Repository`] handle and delegate to it
//! - Print results as JSON lines for scripting
//!
//! The CLI is read-only: it exposes the inspection operations (fsck,
//! ref listing, log, raw changes, traversal, checksum), not the mutating
//! workflows, which only make sense driven by a calling service.

pub mod args;

use anyhow::{Context as _, Result};

use crate::core::config::GitConfig;
use crate::core::types::Oid;
use crate::repo::{LogQuery, Repository};
use crate::revlist::{RevListQuery, RevSpec};

use args::{Cli, Command};

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => GitConfig::from_file(path).context("failed to load config")?,
        None => GitConfig::load().context("failed to load config")?,
    };

    let repo = Repository::open(
        config,
        cli.storage.clone(),
        cli.relative_path(),
        cli.repo.clone(),
        &[],
        None,
    );

    match cli.command {
        Command::Fsck => {
            repo.fsck().context("fsck failed")?;
            println!("ok");
        }
        Command::Branches => {
            for name in repo.branch_names().context("failed to list branches")? {
                println!("{name}");
            }
        }
        Command::Tags => {
            for name in repo.tag_names().context("failed to list tags")? {
                println!("{name}");
            }
        }
        Command::Log {
            ref_name,
            all,
            limit,
            offset,
            skip_merges,
            paths,
        } => {
            let query = LogQuery {
                ref_name,
                all,
                limit,
                offset,
                skip_merges,
                paths,
                ..LogQuery::default()
            };
            for oid in repo.log(&query).context("log failed")? {
                println!("{oid}");
            }
        }
        Command::RawChanges { old_rev, new_rev } => {
            let changes = repo
                .raw_changes_between(&old_rev, &new_rev)
                .context("failed to compute changes")?;
            for change in changes.iter() {
                println!("{}", serde_json::to_string(change)?);
            }
        }
        Command::RevList {
            revisions,
            all,
            not,
            objects,
        } => {
            let including = if all {
                RevSpec::All
            } else {
                RevSpec::Revisions(revisions)
            };
            let query = RevListQuery {
                including,
                excluding: not,
                options: Vec::new(),
                objects,
                require_path: false,
            };
            for entry in repo.rev_list(&query).context("rev-list failed")? {
                let entry = entry.context("rev-list failed")?;
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Command::Checksum => {
            println!("{}", repo.checksum().context("checksum failed")?);
        }
        Command::Lookup { revspec } => {
            match repo.lookup(&revspec).context("lookup failed")? {
                Some(oid) => println!("{oid}"),
                None => anyhow::bail!("revision not found: {revspec}"),
            }
        }
        Command::Ancestor { from, to } => {
            // Exit status carries the answer, shell-style.
            let from = Oid::new(from).context("invalid 'from' object id")?;
            let to = Oid::new(to).context("invalid 'to' object id")?;
            if repo.ancestor(from.as_str(), to.as_str()) {
                println!("true");
            } else {
                println!("false");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
