//! Plumbing-level tests: ref transactions, traversal, diff streaming,
//! worktrees, and the checksum.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use capstan::core::config::GitConfig;
use capstan::core::types::{Oid, RefName, WorktreeId};
use capstan::core::version::GitVersion;
use capstan::diff::ChangeOperation;
use capstan::git::shell::GitShell;
use capstan::git::store::{CliStore, EmbeddedStore};
use capstan::git::GitError;
use capstan::ops::pick::PickRequest;
use capstan::refs::{RefTransaction, RefUpdate, WriteRefOutcome};
use capstan::repo::{
    LogQuery, Repository, WriteRefStrategy, EMPTY_REPOSITORY_CHECKSUM,
};
use capstan::revlist::{RevListQuery, RevSpec};
use capstan::worktree::WorktreeManager;

use common::*;

fn plumbing(repo: &Repository) -> (GitShell, EmbeddedStore) {
    let shell = GitShell::new(GitConfig::default(), repo.path(), Vec::new());
    let store = EmbeddedStore::new(repo.path(), Vec::new());
    (shell, store)
}

// ---------------------------------------------------------------------
// Ref transactions
// ---------------------------------------------------------------------

#[test]
fn batched_ref_updates_are_all_or_nothing() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");

    let (shell, store) = plumbing(&repo);
    let transaction = RefTransaction::new(&shell, &store);

    // refs/heads/ok exists at c1; the second instruction's stale
    // expectation must poison the whole batch.
    transaction
        .write_ref("refs/heads/ok", c1.as_str(), None)
        .expect("seed ref");

    let stale = "1111111111111111111111111111111111111111";
    let batch = [
        RefUpdate::update("refs/heads/created", c1.as_str(), Some(Oid::zero().to_string()))
            .expect("instruction"),
        RefUpdate::update("refs/heads/ok", c1.as_str(), Some(stale.to_string()))
            .expect("instruction"),
    ];
    let err = transaction.commit(&batch).expect_err("batch must fail");
    assert!(matches!(err, GitError::Command { .. }));

    assert!(
        repo.lookup("refs/heads/created").expect("lookup").is_none(),
        "no instruction of a failed batch may be applied"
    );
    assert_eq!(repo.lookup("refs/heads/ok").expect("lookup"), Some(c1));
}

#[test]
fn batched_delete_removes_the_ref() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    create_branch(&repo, "doomed", &c1);

    repo.delete_refs(&["refs/heads/doomed"]).expect("delete");
    assert!(repo.lookup("refs/heads/doomed").expect("lookup").is_none());
}

#[test]
fn direct_write_applies_and_skips() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");

    let outcome = repo
        .write_ref(
            "refs/heads/direct",
            c1.as_str(),
            None,
            WriteRefStrategy::Direct,
        )
        .expect("direct write");
    assert_eq!(outcome, WriteRefOutcome::Applied);
    assert_eq!(repo.lookup("refs/heads/direct").expect("lookup"), Some(c1));

    // A target that is no object: historically swallowed, now visible as
    // a skip.
    let absent = "2222222222222222222222222222222222222222";
    let outcome = repo
        .write_ref(
            "refs/heads/direct",
            absent,
            None,
            WriteRefStrategy::Direct,
        )
        .expect("skips instead of failing");
    assert_eq!(outcome, WriteRefOutcome::SkippedMissingRef);
}

#[test]
fn validation_rejects_bad_instructions_before_spawning() {
    let (_dir, repo) = init_bare_repo();
    let err = repo
        .write_ref("refs/heads/has space", "abc", None, WriteRefStrategy::Batched)
        .expect_err("space in name");
    assert!(matches!(err, GitError::InvalidArgument(_)));
}

#[test]
fn delete_all_refs_except_keeps_the_given_prefixes() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    create_branch(&repo, "other", &c1);
    repo.add_tag("v1", &acting_user(), c1.as_str(), None)
        .expect("tag");

    repo.delete_all_refs_except(&["refs/heads/main"])
        .expect("prune refs");

    assert!(repo.lookup("refs/heads/main").expect("lookup").is_some());
    assert!(repo.lookup("refs/heads/other").expect("lookup").is_none());
    assert!(repo.lookup("refs/tags/v1").expect("lookup").is_none());
}

// ---------------------------------------------------------------------
// Branch and tag CRUD
// ---------------------------------------------------------------------

#[test]
fn branch_crud_round_trip() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let user = acting_user();

    let target = repo.add_branch("topic", &user, c1.as_str()).expect("add");
    assert_eq!(target, c1);
    assert!(repo.branch_exists("topic"));
    assert!(!repo.branch_exists("absent"));
    assert!(!repo.branch_exists("bad name"));

    let mut names = repo.branch_names().expect("names");
    names.sort();
    assert_eq!(names, ["main", "topic"]);

    repo.rm_branch("topic", &user).expect("remove");
    assert!(!repo.branch_exists("topic"));

    let err = repo
        .rm_branch("topic", &user)
        .expect_err("removing twice fails");
    assert!(matches!(err, GitError::InvalidRef(_)));

    let err = repo
        .add_branch("nope", &user, "feedfacefeedfacefeedfacefeedfacefeedface")
        .expect_err("unknown target");
    assert!(matches!(err, GitError::InvalidRef(_)));
}

#[test]
fn tag_crud_round_trip() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let user = acting_user();

    let lightweight = repo.add_tag("v1", &user, c1.as_str(), None).expect("tag");
    assert_eq!(lightweight, c1);

    let annotated = repo
        .add_tag("v2", &user, c1.as_str(), Some("release v2"))
        .expect("annotated tag");
    assert_ne!(annotated, c1);
    // Dereferencing the annotated tag lands on the commit.
    assert_eq!(repo.lookup("refs/tags/v2").expect("lookup"), Some(c1.clone()));

    let err = repo
        .add_tag("v1", &user, c1.as_str(), None)
        .expect_err("tag collision");
    assert!(matches!(err, GitError::TagExists(_)));

    let mut names = repo.tag_names().expect("names");
    names.sort();
    assert_eq!(names, ["v1", "v2"]);

    repo.rm_tag("v1", &user).expect("remove tag");
    assert!(repo.lookup("refs/tags/v1").expect("lookup").is_none());
}

// ---------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------

#[test]
fn traversal_excludes_whats_reachable_from_the_not_set() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_new_file(&repo, "main", "b.txt", "two\n");
    create_branch(&repo, "side", &c1);
    let c3 = commit_new_file(&repo, "side", "c.txt", "three\n");

    let query = RevListQuery {
        including: RevSpec::Revisions(vec!["side".into()]),
        excluding: vec!["main".into()],
        options: vec![],
        objects: false,
        require_path: false,
    };
    let reachable: Vec<Oid> = repo
        .rev_list(&query)
        .expect("spawn")
        .collect::<Result<Vec<_>, _>>()
        .expect("traverse")
        .into_iter()
        .map(|entry| entry.oid)
        .collect();

    assert_eq!(reachable, vec![c3.clone()]);
    assert!(!reachable.contains(&c1));
    assert!(!reachable.contains(&c2));
}

#[test]
fn traversal_of_all_reaches_every_commit() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_new_file(&repo, "main", "b.txt", "two\n");
    create_branch(&repo, "side", &c1);
    let c3 = commit_new_file(&repo, "side", "c.txt", "three\n");

    let oids: Vec<Oid> = repo
        .rev_list(&RevListQuery::all())
        .expect("spawn")
        .collect::<Result<Vec<_>, _>>()
        .expect("traverse")
        .into_iter()
        .map(|entry| entry.oid)
        .collect();

    for oid in [c1, c2, c3] {
        assert!(oids.contains(&oid), "missing {oid}");
    }
}

#[test]
fn object_traversal_with_required_paths_yields_only_pathed_entries() {
    let (_dir, repo) = init_bare_repo();
    commit_new_file(&repo, "main", "a.txt", "one\n");

    let query = RevListQuery::reachable_from("main")
        .objects(true)
        .require_path(true);
    let entries = repo
        .rev_list(&query)
        .expect("spawn")
        .collect::<Result<Vec<_>, _>>()
        .expect("traverse");

    assert!(!entries.is_empty());
    assert!(entries.iter().all(|entry| entry.path.is_some()));
    assert!(entries
        .iter()
        .any(|entry| entry.path.as_deref() == Some("a.txt")));
}

#[test]
fn failed_traversal_surfaces_as_an_error() {
    let (_dir, repo) = init_bare_repo();
    commit_new_file(&repo, "main", "a.txt", "one\n");

    let query = RevListQuery::reachable_from("refs/heads/absent");
    let result: Result<Vec<_>, _> = repo.rev_list(&query).expect("spawn").collect();
    assert!(matches!(result, Err(GitError::Command { .. })));
}

mod lfs_discovery {
    use super::*;
    use capstan::revlist::lfs::{LfsPointer, PointerResolver};
    use std::cell::RefCell;

    /// Records every candidate id it is asked about; resolves none of
    /// them to pointers.
    struct RecordingResolver {
        seen: RefCell<Vec<Oid>>,
    }

    impl RecordingResolver {
        fn new() -> Self {
            Self {
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl PointerResolver for RecordingResolver {
        fn batch_pointers(&self, oids: &[Oid]) -> Result<Vec<LfsPointer>, GitError> {
            self.seen.borrow_mut().extend(oids.iter().cloned());
            Ok(Vec::new())
        }
    }

    #[test]
    fn new_pointers_only_sees_objects_beyond_the_baseline() {
        let (_dir, repo) = init_bare_repo();
        let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
        let c2 = commit_new_file(&repo, "main", "b.txt", "two\n");

        let resolver = RecordingResolver::new();
        let baseline = [c1.to_string()];
        repo.lfs_changes(c2.to_string())
            .new_pointers(None, Some(&baseline), &resolver)
            .expect("discovery");

        let new_blob = repo
            .lookup(&format!("{c2}:b.txt"))
            .expect("lookup")
            .expect("blob");
        let old_blob = repo
            .lookup(&format!("{c1}:a.txt"))
            .expect("lookup")
            .expect("blob");

        let seen = resolver.seen.borrow();
        assert!(seen.contains(&new_blob));
        assert!(!seen.contains(&old_blob), "baseline objects are excluded");
    }

    #[test]
    fn new_pointers_without_baseline_excludes_everything_referenced() {
        let (_dir, repo) = init_bare_repo();
        let c2 = commit_new_file(&repo, "main", "a.txt", "one\n");

        // The target is already referenced by main, so nothing is new.
        let resolver = RecordingResolver::new();
        repo.lfs_changes(c2.to_string())
            .new_pointers(None, None, &resolver)
            .expect("discovery");
        assert!(resolver.seen.borrow().is_empty());
    }

    #[test]
    fn object_limit_caps_the_candidates() {
        let (_dir, repo) = init_bare_repo();
        commit_new_file(&repo, "main", "a.txt", "one\n");
        let tip = commit_new_file(&repo, "main", "b.txt", "two\n");

        let resolver = RecordingResolver::new();
        repo.lfs_changes(tip.to_string())
            .new_pointers(Some(1), Some(&[]), &resolver)
            .expect("discovery");
        assert_eq!(resolver.seen.borrow().len(), 1);
    }

    #[test]
    fn all_pointers_surfaces_every_reachable_blob() {
        let (_dir, repo) = init_bare_repo();
        let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
        let tip = commit_new_file(&repo, "main", "b.txt", "two\n");

        let resolver = RecordingResolver::new();
        repo.lfs_changes(tip.to_string())
            .all_pointers(&resolver)
            .expect("discovery");

        let first_blob = repo
            .lookup(&format!("{c1}:a.txt"))
            .expect("lookup")
            .expect("blob");
        assert!(resolver.seen.borrow().contains(&first_blob));
    }
}

// ---------------------------------------------------------------------
// Raw changes
// ---------------------------------------------------------------------

#[test]
fn raw_changes_resolve_operations_and_sizes() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_actions(
        &repo,
        "main",
        "update and add",
        &[
            capstan::git::store::CommitAction::Update {
                path: "a.txt".into(),
                content: b"one more\n".to_vec(),
            },
            capstan::git::store::CommitAction::Create {
                path: "b.txt".into(),
                content: b"fresh\n".to_vec(),
                executable: false,
            },
        ],
    );

    let changes = repo
        .raw_changes_between(c1.as_str(), c2.as_str())
        .expect("raw changes");
    assert_eq!(changes.len(), 2);

    let modified = changes
        .iter()
        .find(|c| c.operation == ChangeOperation::Modified)
        .expect("modified record");
    assert_eq!(modified.old_path.as_deref(), Some("a.txt"));
    assert_eq!(modified.new_path.as_deref(), Some("a.txt"));
    assert_eq!(modified.blob_size, "one more\n".len() as u64);

    let added = changes
        .iter()
        .find(|c| c.operation == ChangeOperation::Added)
        .expect("added record");
    assert_eq!(added.old_path, None);
    assert_eq!(added.new_path.as_deref(), Some("b.txt"));

    // The resolved blob id is the full object name.
    let blob = repo
        .lookup(&format!("{c2}:b.txt"))
        .expect("lookup")
        .expect("blob");
    assert_eq!(added.blob_id, blob.as_str());
}

#[test]
fn raw_changes_are_memoized_per_revision_pair() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_file_update(&repo, "main", "a.txt", "two\n");

    let first = repo
        .raw_changes_between(c1.as_str(), c2.as_str())
        .expect("raw changes");
    let second = repo
        .raw_changes_between(c1.as_str(), c2.as_str())
        .expect("raw changes");
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn deletions_resolve_through_the_old_blob() {
    let (_dir, repo) = init_bare_repo();
    commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_new_file(&repo, "main", "b.txt", "doomed\n");
    let c3 = commit_actions(
        &repo,
        "main",
        "delete b.txt",
        &[capstan::git::store::CommitAction::Delete {
            path: "b.txt".into(),
        }],
    );

    let changes = repo
        .raw_changes_between(c2.as_str(), c3.as_str())
        .expect("raw changes");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].operation, ChangeOperation::Deleted);
    assert_eq!(changes[0].old_path.as_deref(), Some("b.txt"));
    assert_eq!(changes[0].new_path, None);
    // Size of the deleted blob is known because the old blob was queried.
    assert_eq!(changes[0].blob_size, "doomed\n".len() as u64);
}

// ---------------------------------------------------------------------
// Worktrees
// ---------------------------------------------------------------------

#[test]
fn worktree_is_removed_after_success_and_failure() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");

    let (shell, _) = plumbing(&repo);
    let manager = WorktreeManager::new(&shell);
    let env = HashMap::new();

    let id = WorktreeId::new("wt-success").expect("id");
    let path = repo.worktree_path("test", &id);
    manager
        .with_worktree(&path, c1.as_str(), None, &env, |worktree| {
            assert!(worktree.join("a.txt").exists(), "checkout happened");
            Ok(())
        })
        .expect("body succeeds");
    assert!(!path.exists());

    let id = WorktreeId::new("wt-failure").expect("id");
    let path = repo.worktree_path("test", &id);
    let err = manager
        .with_worktree(&path, c1.as_str(), None, &env, |_worktree| {
            Err::<(), _>(GitError::InvalidArgument("boom".into()))
        })
        .expect_err("body error propagates");
    assert!(matches!(err, GitError::InvalidArgument(_)));
    assert!(!path.exists(), "removed on the error path too");
}

#[test]
fn sparse_worktree_checks_out_only_listed_files() {
    let (_dir, repo) = init_bare_repo();
    commit_new_file(&repo, "main", "a.txt", "one\n");
    let tip = commit_new_file(&repo, "main", "b.txt", "two\n");

    let (shell, _) = plumbing(&repo);
    let manager = WorktreeManager::new(&shell);
    let env = HashMap::new();

    let id = WorktreeId::new("wt-sparse").expect("id");
    let path = repo.worktree_path("test", &id);
    let sparse = vec!["a.txt".to_string()];
    manager
        .with_worktree(&path, tip.as_str(), Some(&sparse), &env, |worktree| {
            assert!(worktree.join("a.txt").exists());
            assert!(!worktree.join("b.txt").exists());
            Ok(())
        })
        .expect("sparse checkout");
    assert!(!path.exists());
}

// ---------------------------------------------------------------------
// Checksum, log, fetch
// ---------------------------------------------------------------------

#[test]
fn exists_and_fsck_accept_a_healthy_repository() {
    let (_dir, repo) = init_bare_repo();
    assert!(repo.exists());
    commit_new_file(&repo, "main", "a.txt", "one\n");
    repo.fsck().expect("healthy repository passes fsck");
}

#[test]
fn checksum_distinguishes_ref_states() {
    let (_dir, repo) = init_bare_repo();
    assert_eq!(repo.checksum().expect("empty"), EMPTY_REPOSITORY_CHECKSUM);

    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let with_branch = repo.checksum().expect("checksum");
    assert_ne!(with_branch, EMPTY_REPOSITORY_CHECKSUM);
    assert_eq!(with_branch, repo.checksum().expect("deterministic"));

    repo.add_tag("v1", &acting_user(), c1.as_str(), None)
        .expect("tag");
    assert_ne!(repo.checksum().expect("after tag"), with_branch);
}

#[test]
fn log_walks_limits_and_offsets() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let c2 = commit_file_update(&repo, "main", "a.txt", "two\n");
    let c3 = commit_file_update(&repo, "main", "a.txt", "three\n");

    let walk = |query: &LogQuery| repo.log(query).expect("log");

    let newest_first = walk(&LogQuery {
        ref_name: Some("refs/heads/main".into()),
        ..LogQuery::default()
    });
    assert_eq!(newest_first, vec![c3.clone(), c2.clone(), c1.clone()]);

    let offset = walk(&LogQuery {
        ref_name: Some("refs/heads/main".into()),
        offset: 1,
        ..LogQuery::default()
    });
    assert_eq!(offset, vec![c2.clone(), c1.clone()]);

    let limited = walk(&LogQuery {
        ref_name: Some("refs/heads/main".into()),
        limit: 1,
        ..LogQuery::default()
    });
    assert_eq!(limited, vec![c3.clone()]);

    let oldest_first = walk(&LogQuery {
        all: true,
        ..LogQuery::default()
    });
    assert_eq!(oldest_first.first(), Some(&c1));

    let unknown_ref = walk(&LogQuery {
        ref_name: Some("refs/heads/absent".into()),
        ..LogQuery::default()
    });
    assert!(unknown_ref.is_empty());
}

#[test]
fn fetch_source_branch_reports_unreachable_sources() {
    let (_dir, repo) = init_bare_repo();
    // Unroutable collaborator: the fetch fails and the answer is a clean
    // "no".
    let config = GitConfig {
        timeout: Some(Duration::from_secs(15)),
        ..GitConfig::default()
    };
    let repo = Repository::open(
        config,
        "default",
        "fixture.git",
        repo.path(),
        &[],
        None,
    );
    let fetched = repo
        .fetch_source_branch(&HashMap::new(), "main", "refs/heads/imported")
        .expect("fetch_source_branch");
    assert!(!fetched);
    assert!(repo.lookup("refs/heads/imported").expect("lookup").is_none());
}

// ---------------------------------------------------------------------
// CLI-driven store backend
// ---------------------------------------------------------------------

/// The CLI backend needs `merge-tree --write-tree`.
fn cli_backed(repo: &Repository) -> Option<Repository> {
    if repo.git_version().expect("git version") < GitVersion::new(2, 38, 0) {
        return None;
    }
    let shell = GitShell::new(GitConfig::default(), repo.path(), Vec::new());
    Some(
        Repository::open(
            GitConfig::default(),
            "default",
            "fixture.git",
            repo.path(),
            &[],
            None,
        )
        .with_store(Arc::new(CliStore::new(shell))),
    )
}

#[test]
fn cli_store_resolves_commits_like_the_embedded_store() {
    let (_dir, repo) = init_bare_repo();
    let c1 = commit_new_file(&repo, "main", "a.txt", "one\n");
    let Some(cli_repo) = cli_backed(&repo) else {
        return;
    };

    let embedded = repo.commit(c1.as_str()).expect("resolve").expect("commit");
    let via_cli = cli_repo
        .commit(c1.as_str())
        .expect("resolve")
        .expect("commit");

    assert_eq!(via_cli.oid, embedded.oid);
    assert_eq!(via_cli.tree, embedded.tree);
    assert_eq!(via_cli.parents, embedded.parents);
    assert_eq!(via_cli.author.email, embedded.author.email);
    assert_eq!(via_cli.author.when, embedded.author.when);
}

#[test]
fn cli_store_runs_the_merge_workflow() {
    let (_dir, repo) = init_bare_repo();
    let base = commit_new_file(&repo, "main", "a.txt", "one\n");
    create_branch(&repo, "feature", &base);
    let feature_tip = commit_new_file(&repo, "feature", "b.txt", "two\n");
    let Some(cli_repo) = cli_backed(&repo) else {
        return;
    };

    let user = acting_user();
    let update = cli_repo
        .merge(&user, &feature_tip, "main", "Merge feature into main")
        .expect("merge")
        .expect("merge produced a commit");

    let merge_commit = cli_repo
        .commit(update.newrev.as_str())
        .expect("resolve")
        .expect("merge commit");
    assert_eq!(merge_commit.parents, vec![base, feature_tip]);
}

#[test]
fn cli_store_treats_conflicts_as_no_merge() {
    let (_dir, repo) = init_bare_repo();
    let base = commit_new_file(&repo, "main", "a.txt", "base\n");
    create_branch(&repo, "feature", &base);
    commit_file_update(&repo, "feature", "a.txt", "feature change\n");
    let main_tip = commit_file_update(&repo, "main", "a.txt", "main change\n");
    let Some(cli_repo) = cli_backed(&repo) else {
        return;
    };

    let feature_tip = branch_tip(&repo, "feature").expect("tip");
    let user = acting_user();
    let outcome = cli_repo
        .merge(&user, &feature_tip, "main", "Merge feature into main")
        .expect("merge call");
    assert!(outcome.is_none());
    assert_eq!(branch_tip(&repo, "main"), Some(main_tip));
}

#[test]
fn cli_store_builds_commits_from_actions() {
    let (_dir, repo) = init_bare_repo();
    commit_new_file(&repo, "main", "a.txt", "one\n");
    let Some(cli_repo) = cli_backed(&repo) else {
        return;
    };

    let tip = commit_actions(
        &cli_repo,
        "main",
        "rework",
        &[
            capstan::git::store::CommitAction::Update {
                path: "a.txt".into(),
                content: b"two\n".to_vec(),
            },
            capstan::git::store::CommitAction::Create {
                path: "b.txt".into(),
                content: b"new\n".to_vec(),
                executable: false,
            },
        ],
    );

    assert!(cli_repo
        .lookup(&format!("{tip}:b.txt"))
        .expect("lookup")
        .is_some());
    assert_eq!(branch_tip(&repo, "main"), Some(tip));
}

#[test]
fn cli_store_cherry_pick_preserves_authorship() {
    let (_dir, repo) = init_bare_repo();
    let base = commit_new_file(&repo, "main", "a.txt", "one\n");
    create_branch(&repo, "topic", &base);
    let picked = commit_actions_as(
        &repo,
        "topic",
        "topic change",
        &[capstan::git::store::CommitAction::Create {
            path: "t.txt".into(),
            content: b"topic\n".to_vec(),
            executable: false,
        }],
        Some(&capstan::core::identity::Identity::new(
            "Alice",
            "alice@example.com",
        )),
    );
    let Some(cli_repo) = cli_backed(&repo) else {
        return;
    };

    let user = acting_user();
    let update = cli_repo
        .cherry_pick(&PickRequest {
            user: &user,
            commit: picked.as_str(),
            branch_name: "main",
            message: "pick topic change",
            start_branch_name: None,
        })
        .expect("cherry-pick")
        .expect("pick produced a commit");

    let new_commit = cli_repo
        .commit(update.newrev.as_str())
        .expect("resolve")
        .expect("commit");
    assert_eq!(new_commit.author.email, "alice@example.com");
    assert_eq!(new_commit.committer.email, "test@example.com");
}

#[test]
fn ref_name_validation_guards_the_cli_surface() {
    // RefName is the shared gate for both strategies; a name the stdin
    // protocol cannot carry never reaches a subprocess.
    assert!(RefName::new("refs/heads/ok").is_ok());
    assert!(RefName::new("refs/heads/not ok").is_err());
}
