//! git::store::embedded
//!
//! `git2`-backed [`ObjectStore`].

use std::path::{Path, PathBuf};

use git2::{ErrorClass, ErrorCode, ObjectType, Repository, Signature, Time};

use crate::core::types::{Oid, RefName};
use crate::git::store::{
    validate_action_path, CommitAction, CommitBlueprint, CommitSignature, CommitSnapshot,
    ObjectStore, PickMode, RefWriteError, SignatureInfo, SignatureTime, TagAnnotation,
    ThreeWayResult,
};
use crate::git::GitError;

/// In-process object store over libgit2.
pub struct EmbeddedStore {
    repo_path: PathBuf,
    alternate_object_dirs: Vec<PathBuf>,
}

impl EmbeddedStore {
    pub fn new(repo_path: impl Into<PathBuf>, alternate_object_dirs: Vec<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            alternate_object_dirs,
        }
    }

    /// Open a fresh handle per call. libgit2 caches packed-refs in the
    /// handle, which goes stale when refs are rewritten externally between
    /// calls.
    fn open(&self) -> Result<Repository, GitError> {
        let repo = Repository::open(&self.repo_path).map_err(|e| match e.code() {
            ErrorCode::NotFound => GitError::NoRepository {
                path: self.repo_path.clone(),
            },
            _ => GitError::InvalidRepository(e.message().to_string()),
        })?;
        if !self.alternate_object_dirs.is_empty() {
            let odb = repo.odb()?;
            for dir in &self.alternate_object_dirs {
                odb.add_disk_alternate(dir.to_string_lossy().as_ref())?;
            }
        }
        Ok(repo)
    }

    fn git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
        git2::Oid::from_str(oid.as_str()).map_err(GitError::from)
    }

    fn our_oid(oid: git2::Oid) -> Result<Oid, GitError> {
        Ok(Oid::new(oid.to_string())?)
    }

    fn signature<'a>(sig: &'a CommitSignature) -> Result<Signature<'a>, GitError> {
        let identity = &sig.identity;
        match sig.when {
            Some(when) => Ok(Signature::new(
                &identity.name,
                &identity.email,
                &Time::new(when.seconds, when.offset_minutes),
            )?),
            None => Ok(Signature::now(&identity.name, &identity.email)?),
        }
    }

    fn snapshot(commit: &git2::Commit<'_>) -> Result<CommitSnapshot, GitError> {
        fn info(signature: &Signature<'_>) -> SignatureInfo {
            SignatureInfo {
                name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
                email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
                when: SignatureTime {
                    seconds: signature.when().seconds(),
                    offset_minutes: signature.when().offset_minutes(),
                },
            }
        }
        Ok(CommitSnapshot {
            oid: Self::our_oid(commit.id())?,
            tree: Self::our_oid(commit.tree_id())?,
            parents: commit
                .parent_ids()
                .map(Self::our_oid)
                .collect::<Result<Vec<_>, _>>()?,
            author: info(&commit.author()),
            committer: info(&commit.committer()),
        })
    }

    fn index_result(
        repo: &Repository,
        mut index: git2::Index,
    ) -> Result<ThreeWayResult, GitError> {
        if index.has_conflicts() {
            return Ok(ThreeWayResult::Conflict);
        }
        let tree = index.write_tree_to(repo)?;
        Ok(ThreeWayResult::Tree(Self::our_oid(tree)?))
    }

    fn index_entry(path: &str, id: git2::Oid, mode: u32, size: usize) -> git2::IndexEntry {
        git2::IndexEntry {
            ctime: git2::IndexTime::new(0, 0),
            mtime: git2::IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            file_size: size as u32,
            id,
            flags: 0,
            flags_extended: 0,
            path: path.as_bytes().to_vec(),
        }
    }

    fn existing_entry(index: &git2::Index, path: &str) -> Result<git2::IndexEntry, GitError> {
        index
            .get_path(Path::new(path), 0)
            .ok_or_else(|| GitError::InvalidArgument(format!("file does not exist: {path}")))
    }

    fn file_mode(executable: bool) -> u32 {
        if executable {
            0o100755
        } else {
            0o100644
        }
    }

    fn apply_action(
        repo: &Repository,
        index: &mut git2::Index,
        action: &CommitAction,
    ) -> Result<(), GitError> {
        match action {
            CommitAction::Create {
                path,
                content,
                executable,
            } => {
                validate_action_path(path)?;
                if index.get_path(Path::new(path), 0).is_some() {
                    return Err(GitError::InvalidArgument(format!(
                        "file already exists: {path}"
                    )));
                }
                let blob = repo.blob(content)?;
                index.add(&Self::index_entry(
                    path,
                    blob,
                    Self::file_mode(*executable),
                    content.len(),
                ))?;
            }
            CommitAction::CreateDir { path } => {
                validate_action_path(path)?;
                if index.get_path(Path::new(path), 0).is_some() {
                    return Err(GitError::InvalidArgument(format!(
                        "a file exists at: {path}"
                    )));
                }
                let prefix = format!("{path}/");
                if index
                    .iter()
                    .any(|entry| entry.path.starts_with(prefix.as_bytes()))
                {
                    return Err(GitError::InvalidArgument(format!(
                        "directory already exists: {path}"
                    )));
                }
                let blob = repo.blob(b"")?;
                let keep = format!("{path}/.gitkeep");
                index.add(&Self::index_entry(&keep, blob, Self::file_mode(false), 0))?;
            }
            CommitAction::Update { path, content } => {
                validate_action_path(path)?;
                let previous = Self::existing_entry(index, path)?;
                let blob = repo.blob(content)?;
                index.add(&Self::index_entry(path, blob, previous.mode, content.len()))?;
            }
            CommitAction::Move {
                previous_path,
                path,
                content,
            } => {
                validate_action_path(previous_path)?;
                validate_action_path(path)?;
                let previous = Self::existing_entry(index, previous_path)?;
                let (blob, size) = match content {
                    Some(bytes) => (repo.blob(bytes)?, bytes.len()),
                    None => {
                        let existing = repo.find_blob(previous.id)?;
                        (previous.id, existing.content().len())
                    }
                };
                index.remove(Path::new(previous_path), 0)?;
                index.add(&Self::index_entry(path, blob, previous.mode, size))?;
            }
            CommitAction::Delete { path } => {
                validate_action_path(path)?;
                Self::existing_entry(index, path)?;
                index.remove(Path::new(path), 0)?;
            }
            CommitAction::Chmod { path, executable } => {
                validate_action_path(path)?;
                let previous = Self::existing_entry(index, path)?;
                let size = previous.file_size as usize;
                index.add(&Self::index_entry(
                    path,
                    previous.id,
                    Self::file_mode(*executable),
                    size,
                ))?;
            }
        }
        Ok(())
    }
}

impl ObjectStore for EmbeddedStore {
    fn resolve(&self, revspec: &str) -> Result<Option<Oid>, GitError> {
        let repo = self.open()?;
        let resolved = repo.revparse_single(revspec);
        match resolved {
            Ok(object) => {
                // Annotated tags are dereferenced to the object they name.
                let peeled = object.peel(ObjectType::Any).unwrap_or(object);
                Ok(Some(Self::our_oid(peeled.id())?))
            }
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_commit(&self, revspec: &str) -> Result<Option<CommitSnapshot>, GitError> {
        let repo = self.open()?;
        let resolved = repo.revparse_single(revspec);
        let object = match resolved {
            Ok(object) => object,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        let peeled = object.peel(ObjectType::Commit);
        match peeled {
            Ok(peeled) => match peeled.into_commit() {
                Ok(commit) => Ok(Some(Self::snapshot(&commit)?)),
                Err(_) => Ok(None),
            },
            Err(_) => Ok(None),
        }
    }

    fn merge_commits(&self, ours: &Oid, theirs: &Oid) -> Result<ThreeWayResult, GitError> {
        let repo = self.open()?;
        let our_commit = repo.find_commit(Self::git2_oid(ours)?)?;
        let their_commit = repo.find_commit(Self::git2_oid(theirs)?)?;
        let index = repo.merge_commits(&our_commit, &their_commit, None)?;
        Self::index_result(&repo, index)
    }

    fn pick_commit(
        &self,
        commit: &Oid,
        onto: &Oid,
        mainline: Option<u32>,
        mode: PickMode,
    ) -> Result<ThreeWayResult, GitError> {
        let repo = self.open()?;
        let picked = repo.find_commit(Self::git2_oid(commit)?)?;
        let our_commit = repo.find_commit(Self::git2_oid(onto)?)?;
        let mainline = mainline.unwrap_or(0);
        let index = match mode {
            PickMode::CherryPick => repo.cherrypick_commit(&picked, &our_commit, mainline, None)?,
            PickMode::Revert => repo.revert_commit(&picked, &our_commit, mainline, None)?,
        };
        Self::index_result(&repo, index)
    }

    fn apply_commit_actions(
        &self,
        base: Option<&Oid>,
        actions: &[CommitAction],
    ) -> Result<Oid, GitError> {
        let repo = self.open()?;
        let mut index = git2::Index::new()?;
        if let Some(base) = base {
            let commit = repo.find_commit(Self::git2_oid(base)?)?;
            index.read_tree(&commit.tree()?)?;
        }
        for action in actions {
            Self::apply_action(&repo, &mut index, action)?;
        }
        let tree = index.write_tree_to(&repo)?;
        Self::our_oid(tree)
    }

    fn create_commit(&self, blueprint: &CommitBlueprint) -> Result<Oid, GitError> {
        let repo = self.open()?;
        let author = Self::signature(&blueprint.author)?;
        let committer = Self::signature(&blueprint.committer)?;
        let tree = repo.find_tree(Self::git2_oid(&blueprint.tree)?)?;
        let parents = blueprint
            .parents
            .iter()
            .map(|p| repo.find_commit(Self::git2_oid(p)?).map_err(GitError::from))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        // Bare carriage returns break the commit object's header parsing.
        let message = blueprint.message.replace('\r', "");
        let oid = repo.commit(None, &author, &committer, &message, &tree, &parent_refs)?;
        Self::our_oid(oid)
    }

    fn write_ref(&self, name: &RefName, target: &Oid) -> Result<(), RefWriteError> {
        let repo = self.open().map_err(RefWriteError::Other)?;
        let oid = Self::git2_oid(target).map_err(RefWriteError::Other)?;
        let written = repo.reference(name.as_str(), oid, true, "capstan: write ref");
        match written {
            Ok(_) => Ok(()),
            Err(e) => match (e.code(), e.class()) {
                (ErrorCode::NotFound, _) => Err(RefWriteError::NotFound(e.message().to_string())),
                (ErrorCode::InvalidSpec, _) => {
                    Err(RefWriteError::InvalidName(e.message().to_string()))
                }
                (ErrorCode::Locked, _) => {
                    Err(RefWriteError::LockContention(e.message().to_string()))
                }
                // A missing target object surfaces as a generic
                // reference-class error, not as NotFound.
                (_, ErrorClass::Reference) => {
                    Err(RefWriteError::NotFound(e.message().to_string()))
                }
                _ => Err(RefWriteError::Other(e.into())),
            },
        }
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), GitError> {
        let repo = self.open()?;
        let mut reference = repo
            .find_reference(name.as_str())
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => GitError::InvalidRef(name.to_string()),
                _ => e.into(),
            })?;
        reference.delete()?;
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError> {
        let repo = self.open()?;
        let pattern = format!("{prefix}*");
        let mut entries = Vec::new();
        for reference in repo.references_glob(&pattern)? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };
            let Ok(name) = RefName::new(name) else {
                continue;
            };
            let resolved = reference.resolve().unwrap_or(reference);
            let Some(target) = resolved.target() else {
                continue;
            };
            entries.push((name, Self::our_oid(target)?));
        }
        Ok(entries)
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let repo = self.open()?;
        match repo.merge_base(Self::git2_oid(a)?, Self::git2_oid(b)?) {
            Ok(oid) => Ok(Some(Self::our_oid(oid)?)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let repo = self.open()?;
        Ok(repo.graph_descendant_of(Self::git2_oid(descendant)?, Self::git2_oid(ancestor)?)?)
    }

    fn diff_exists(&self, from: &str, to: &str) -> Result<bool, GitError> {
        let repo = self.open()?;
        let tree_of = |spec: &str| -> Result<git2::Tree<'_>, GitError> {
            let object = repo
                .revparse_single(spec)
                .map_err(|_| GitError::InvalidRef(spec.to_string()))?;
            object
                .peel(ObjectType::Tree)
                .map_err(GitError::from)?
                .into_tree()
                .map_err(|_| GitError::InvalidRef(spec.to_string()))
        };
        let from_tree = tree_of(from)?;
        let to_tree = tree_of(to)?;
        let diff = repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?;
        Ok(diff.deltas().len() > 0)
    }

    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        annotation: Option<TagAnnotation<'_>>,
    ) -> Result<Oid, GitError> {
        let repo = self.open()?;
        let tag_ref = format!("refs/tags/{name}");
        if repo.find_reference(&tag_ref).is_ok() {
            return Err(GitError::TagExists(name.to_string()));
        }
        let object = repo.find_object(Self::git2_oid(target)?, None)?;
        let oid = match annotation {
            Some(annotation) => {
                let tagger = Signature::now(&annotation.tagger.name, &annotation.tagger.email)?;
                repo.tag(name, &object, &tagger, annotation.message, false)?
            }
            None => repo.tag_lightweight(name, &object, false)?,
        };
        Self::our_oid(oid)
    }

    fn add_remote(&self, name: &str, url: &str, mirror: bool) -> Result<(), GitError> {
        let repo = self.open()?;
        match repo.remote(name, url) {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::Exists => {
                repo.remote_set_url(name, url)?;
            }
            Err(e) => return Err(e.into()),
        }
        if mirror {
            let mut config = repo.config()?;
            config.set_str(&format!("remote.{name}.fetch"), "+refs/*:refs/*")?;
            config.set_bool(&format!("remote.{name}.mirror"), true)?;
            config.set_bool(&format!("remote.{name}.prune"), true)?;
        }
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<bool, GitError> {
        let repo = self.open()?;
        // Mirror remotes map their refs into the top-level namespace;
        // clearing the fetch mapping first keeps those refs alive.
        let mut config = repo.config()?;
        if config.get_bool(&format!("remote.{name}.mirror")).unwrap_or(false) {
            let _ = config.remove(&format!("remote.{name}.fetch"));
        }
        match repo.remote_delete(name) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        repo.remote_set_url(name, url)?;
        Ok(())
    }
}
