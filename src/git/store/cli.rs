//! git::store::cli
//!
//! Plumbing-command-backed [`ObjectStore`].
//!
//! Every operation here is realized with the porcelain-free plumbing set:
//! `rev-parse`, `cat-file`, `merge-tree --write-tree`, `commit-tree`,
//! `update-ref`, `for-each-ref`, `hash-object`, and a throwaway index file
//! driven through `read-tree`/`update-index`/`write-tree`.
//!
//! Three-way computation requires a git that provides
//! `merge-tree --write-tree` (2.38 or later).

use std::collections::BTreeMap;
use std::fs;

use uuid::Uuid;

use crate::core::types::{Oid, RefName};
use crate::git::shell::GitShell;
use crate::git::store::{
    validate_action_path, CommitAction, CommitBlueprint, CommitSignature, CommitSnapshot,
    ObjectStore, PickMode, RefWriteError, SignatureInfo, SignatureTime, TagAnnotation,
    ThreeWayResult,
};
use crate::git::GitError;

/// Subprocess-backed object store.
pub struct CliStore {
    shell: GitShell,
}

impl CliStore {
    pub fn new(shell: GitShell) -> Self {
        Self { shell }
    }

    fn rev_parse(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        let invocation = self.shell.git(["rev-parse", "--verify", "--quiet", spec]);
        let output = invocation.run()?;
        match output.code() {
            Some(0) => {
                let oid = output.stdout_trimmed();
                if oid.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Oid::new(oid)?))
                }
            }
            Some(1) => Ok(None),
            _ => Err(GitError::Command {
                context: invocation.context(),
                output: output.combined(),
            }),
        }
    }

    fn date_value(when: &SignatureTime) -> String {
        let sign = if when.offset_minutes < 0 { '-' } else { '+' };
        let magnitude = when.offset_minutes.unsigned_abs();
        format!(
            "{} {}{:02}{:02}",
            when.seconds,
            sign,
            magnitude / 60,
            magnitude % 60
        )
    }

    fn signature_env(
        prefix: &str,
        signature: &CommitSignature,
        env: &mut Vec<(String, String)>,
    ) {
        env.push((
            format!("GIT_{prefix}_NAME"),
            signature.identity.name.clone(),
        ));
        env.push((
            format!("GIT_{prefix}_EMAIL"),
            signature.identity.email.clone(),
        ));
        if let Some(when) = &signature.when {
            env.push((format!("GIT_{prefix}_DATE"), Self::date_value(when)));
        }
    }

    /// Parse the headers of a `cat-file -p` commit dump.
    fn parse_commit(oid: Oid, raw: &str) -> Result<CommitSnapshot, GitError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in raw.lines() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(Oid::new(rest.trim())?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(Oid::new(rest.trim())?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Self::parse_signature_line(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Self::parse_signature_line(rest)?);
            }
        }

        let tree = tree.ok_or_else(|| {
            GitError::Store(format!("commit {oid} has no tree header"))
        })?;
        let author = author.ok_or_else(|| {
            GitError::Store(format!("commit {oid} has no author header"))
        })?;
        let committer = committer.ok_or_else(|| {
            GitError::Store(format!("commit {oid} has no committer header"))
        })?;

        Ok(CommitSnapshot {
            oid,
            tree,
            parents,
            author,
            committer,
        })
    }

    /// `Name <email> 1234567890 +0100`
    fn parse_signature_line(line: &str) -> Result<SignatureInfo, GitError> {
        let malformed = || GitError::Store(format!("malformed signature line: {line:?}"));

        let (ident, when) = line.rsplit_once('>').ok_or_else(malformed)?;
        let (name, email) = ident.rsplit_once('<').ok_or_else(malformed)?;
        let mut when_parts = when.split_whitespace();
        let seconds = when_parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        let offset = when_parts.next().unwrap_or("+0000");
        let offset_minutes = Self::parse_offset(offset).ok_or_else(malformed)?;

        Ok(SignatureInfo {
            name: name.trim_end().to_string(),
            email: email.trim().to_string(),
            when: SignatureTime {
                seconds,
                offset_minutes,
            },
        })
    }

    fn parse_offset(offset: &str) -> Option<i32> {
        let mut chars = offset.chars();
        let sign = match chars.next()? {
            '+' => 1,
            '-' => -1,
            _ => return None,
        };
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        Some(sign * (hours * 60 + minutes))
    }

    fn merge_tree(&self, base: Option<&str>, ours: &Oid, theirs: &Oid) -> Result<ThreeWayResult, GitError> {
        let mut args = vec![
            "merge-tree".to_string(),
            "--write-tree".to_string(),
            "--no-messages".to_string(),
        ];
        if let Some(base) = base {
            args.push(format!("--merge-base={base}"));
        }
        args.push(ours.to_string());
        args.push(theirs.to_string());

        let invocation = self.shell.git(&args);
        let output = invocation.run()?;
        match output.code() {
            Some(0) => {
                let tree = output
                    .stdout_trimmed()
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                Ok(ThreeWayResult::Tree(Oid::new(tree)?))
            }
            Some(1) => Ok(ThreeWayResult::Conflict),
            _ => Err(GitError::Command {
                context: invocation.context(),
                output: output.combined(),
            }),
        }
    }

    /// Flat blob listing of a commit's tree: path -> (mode, oid).
    fn tree_entries(&self, base: &Oid) -> Result<BTreeMap<String, (String, Oid)>, GitError> {
        let stdout = self
            .shell
            .git(["ls-tree", "-r", "-z", base.as_str()])
            .run_checked()?;

        let mut entries = BTreeMap::new();
        for record in stdout.split(|b| *b == 0) {
            if record.is_empty() {
                continue;
            }
            let tab = record
                .iter()
                .position(|b| *b == b'\t')
                .ok_or_else(|| GitError::Store("malformed ls-tree record".into()))?;
            let header = std::str::from_utf8(&record[..tab])
                .map_err(|_| GitError::Store("malformed ls-tree header".into()))?;
            let path = String::from_utf8_lossy(&record[tab + 1..]).into_owned();

            let mut parts = header.split_whitespace();
            let mode = parts
                .next()
                .ok_or_else(|| GitError::Store("ls-tree record missing mode".into()))?;
            let object_type = parts
                .next()
                .ok_or_else(|| GitError::Store("ls-tree record missing type".into()))?;
            let oid = parts
                .next()
                .ok_or_else(|| GitError::Store("ls-tree record missing oid".into()))?;

            if object_type == "blob" {
                entries.insert(path, (mode.to_string(), Oid::new(oid)?));
            }
        }
        Ok(entries)
    }

    fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let stdout = self
            .shell
            .git(["hash-object", "-w", "--stdin"])
            .stdin_bytes(content)
            .run_checked()?;
        Ok(Oid::new(String::from_utf8_lossy(&stdout).trim())?)
    }

    fn mode_str(executable: bool) -> &'static str {
        if executable {
            "100755"
        } else {
            "100644"
        }
    }

    fn apply_to_entries(
        &self,
        entries: &mut BTreeMap<String, (String, Oid)>,
        action: &CommitAction,
    ) -> Result<(), GitError> {
        match action {
            CommitAction::Create {
                path,
                content,
                executable,
            } => {
                validate_action_path(path)?;
                if entries.contains_key(path) {
                    return Err(GitError::InvalidArgument(format!(
                        "file already exists: {path}"
                    )));
                }
                let blob = self.write_blob(content)?;
                entries.insert(path.clone(), (Self::mode_str(*executable).into(), blob));
            }
            CommitAction::CreateDir { path } => {
                validate_action_path(path)?;
                if entries.contains_key(path) {
                    return Err(GitError::InvalidArgument(format!(
                        "a file exists at: {path}"
                    )));
                }
                let prefix = format!("{path}/");
                if entries.keys().any(|p| p.starts_with(&prefix)) {
                    return Err(GitError::InvalidArgument(format!(
                        "directory already exists: {path}"
                    )));
                }
                let blob = self.write_blob(b"")?;
                entries.insert(format!("{path}/.gitkeep"), (Self::mode_str(false).into(), blob));
            }
            CommitAction::Update { path, content } => {
                validate_action_path(path)?;
                let (mode, _) = entries
                    .get(path)
                    .cloned()
                    .ok_or_else(|| GitError::InvalidArgument(format!("file does not exist: {path}")))?;
                let blob = self.write_blob(content)?;
                entries.insert(path.clone(), (mode, blob));
            }
            CommitAction::Move {
                previous_path,
                path,
                content,
            } => {
                validate_action_path(previous_path)?;
                validate_action_path(path)?;
                let (mode, oid) = entries.remove(previous_path).ok_or_else(|| {
                    GitError::InvalidArgument(format!("file does not exist: {previous_path}"))
                })?;
                let blob = match content {
                    Some(bytes) => self.write_blob(bytes)?,
                    None => oid,
                };
                entries.insert(path.clone(), (mode, blob));
            }
            CommitAction::Delete { path } => {
                validate_action_path(path)?;
                entries.remove(path).ok_or_else(|| {
                    GitError::InvalidArgument(format!("file does not exist: {path}"))
                })?;
            }
            CommitAction::Chmod { path, executable } => {
                validate_action_path(path)?;
                let (_, oid) = entries
                    .get(path)
                    .cloned()
                    .ok_or_else(|| GitError::InvalidArgument(format!("file does not exist: {path}")))?;
                entries.insert(path.clone(), (Self::mode_str(*executable).into(), oid));
            }
        }
        Ok(())
    }

    fn stderr_contains(output: &str, pattern: &str) -> bool {
        output.to_ascii_lowercase().contains(pattern)
    }
}

impl ObjectStore for CliStore {
    fn resolve(&self, revspec: &str) -> Result<Option<Oid>, GitError> {
        self.rev_parse(&format!("{revspec}^{{}}"))
    }

    fn resolve_commit(&self, revspec: &str) -> Result<Option<CommitSnapshot>, GitError> {
        let Some(oid) = self.rev_parse(&format!("{revspec}^{{commit}}"))? else {
            return Ok(None);
        };
        let stdout = self
            .shell
            .git(["cat-file", "-p", oid.as_str()])
            .run_checked()?;
        Ok(Some(Self::parse_commit(
            oid,
            &String::from_utf8_lossy(&stdout),
        )?))
    }

    fn merge_commits(&self, ours: &Oid, theirs: &Oid) -> Result<ThreeWayResult, GitError> {
        self.merge_tree(None, ours, theirs)
    }

    fn pick_commit(
        &self,
        commit: &Oid,
        onto: &Oid,
        mainline: Option<u32>,
        mode: PickMode,
    ) -> Result<ThreeWayResult, GitError> {
        let parent_spec = format!("{}^{}", commit, mainline.unwrap_or(1));
        let parent = self.rev_parse(&parent_spec)?.ok_or_else(|| {
            GitError::InvalidArgument(format!("commit {commit} has no parent {parent_spec}"))
        })?;
        match mode {
            PickMode::CherryPick => self.merge_tree(Some(parent.as_str()), onto, commit),
            PickMode::Revert => self.merge_tree(Some(commit.as_str()), onto, &parent),
        }
    }

    fn apply_commit_actions(
        &self,
        base: Option<&Oid>,
        actions: &[CommitAction],
    ) -> Result<Oid, GitError> {
        let mut entries = match base {
            Some(base) => self.tree_entries(base)?,
            None => BTreeMap::new(),
        };
        for action in actions {
            self.apply_to_entries(&mut entries, action)?;
        }

        // Stage the final listing into a throwaway index, then write the
        // tree out of it.
        let index_path = self
            .shell
            .repo_path()
            .join(format!("capstan-index-{}", Uuid::new_v4()));
        let index_env = index_path.to_string_lossy().into_owned();

        let result = (|| {
            self.shell
                .git(["read-tree", "--empty"])
                .env("GIT_INDEX_FILE", &index_env)
                .run_checked()?;

            let mut records = Vec::new();
            for (path, (mode, oid)) in &entries {
                records.extend_from_slice(format!("{mode} {oid}\t{path}\0").as_bytes());
            }
            self.shell
                .git(["update-index", "-z", "--index-info"])
                .env("GIT_INDEX_FILE", &index_env)
                .stdin_bytes(records)
                .run_checked()?;

            let stdout = self
                .shell
                .git(["write-tree"])
                .env("GIT_INDEX_FILE", &index_env)
                .run_checked()?;
            Ok(Oid::new(String::from_utf8_lossy(&stdout).trim())?)
        })();

        let _ = fs::remove_file(&index_path);
        result
    }

    fn create_commit(&self, blueprint: &CommitBlueprint) -> Result<Oid, GitError> {
        let mut args = vec!["commit-tree".to_string(), blueprint.tree.to_string()];
        for parent in &blueprint.parents {
            args.push("-p".to_string());
            args.push(parent.to_string());
        }
        args.push("-m".to_string());
        args.push(blueprint.message.replace('\r', ""));

        let mut env = Vec::new();
        Self::signature_env("AUTHOR", &blueprint.author, &mut env);
        Self::signature_env("COMMITTER", &blueprint.committer, &mut env);

        let mut invocation = self.shell.git(&args);
        for (k, v) in env {
            invocation = invocation.env(k, v);
        }
        let stdout = invocation.run_checked()?;
        Ok(Oid::new(String::from_utf8_lossy(&stdout).trim())?)
    }

    fn write_ref(&self, name: &RefName, target: &Oid) -> Result<(), RefWriteError> {
        let invocation = self
            .shell
            .git(["update-ref", name.as_str(), target.as_str()]);
        let output = invocation.run().map_err(RefWriteError::Other)?;
        if output.success() {
            return Ok(());
        }
        let combined = output.combined();
        if Self::stderr_contains(&combined, "bad ref name")
            || Self::stderr_contains(&combined, "invalid ref")
            || Self::stderr_contains(&combined, "refusing to update ref")
        {
            return Err(RefWriteError::InvalidName(combined));
        }
        if Self::stderr_contains(&combined, "nonexistent object")
            || Self::stderr_contains(&combined, "not a valid sha1")
            || Self::stderr_contains(&combined, "missing object")
        {
            return Err(RefWriteError::NotFound(combined));
        }
        if Self::stderr_contains(&combined, ".lock") {
            return Err(RefWriteError::LockContention(combined));
        }
        Err(RefWriteError::Other(GitError::Command {
            context: invocation.context(),
            output: combined,
        }))
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), GitError> {
        let invocation = self.shell.git(["update-ref", "-d", name.as_str()]);
        let output = invocation.run()?;
        if output.success() {
            return Ok(());
        }
        let combined = output.combined();
        if Self::stderr_contains(&combined, "unable to delete")
            || Self::stderr_contains(&combined, "not exist")
            || Self::stderr_contains(&combined, "unable to resolve")
        {
            return Err(GitError::InvalidRef(name.to_string()));
        }
        Err(GitError::Command {
            context: invocation.context(),
            output: combined,
        })
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError> {
        let stdout = self
            .shell
            .git(["for-each-ref", "--format=%(objectname) %(refname)", prefix])
            .run_checked()?;
        let mut entries = Vec::new();
        for line in String::from_utf8_lossy(&stdout).lines() {
            let Some((oid, name)) = line.split_once(' ') else {
                continue;
            };
            let Ok(name) = RefName::new(name) else {
                continue;
            };
            entries.push((name, Oid::new(oid)?));
        }
        Ok(entries)
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let invocation = self.shell.git(["merge-base", a.as_str(), b.as_str()]);
        let output = invocation.run()?;
        match output.code() {
            Some(0) => Ok(Some(Oid::new(output.stdout_trimmed())?)),
            Some(1) => Ok(None),
            _ => Err(GitError::Command {
                context: invocation.context(),
                output: output.combined(),
            }),
        }
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        let invocation = self.shell.git([
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ]);
        let output = invocation.run()?;
        match output.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::Command {
                context: invocation.context(),
                output: output.combined(),
            }),
        }
    }

    fn diff_exists(&self, from: &str, to: &str) -> Result<bool, GitError> {
        let invocation = self.shell.git(["diff", "--quiet", from, to]);
        let output = invocation.run()?;
        match output.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitError::Command {
                context: invocation.context(),
                output: output.combined(),
            }),
        }
    }

    fn create_tag(
        &self,
        name: &str,
        target: &Oid,
        annotation: Option<TagAnnotation<'_>>,
    ) -> Result<Oid, GitError> {
        let tag_ref = format!("refs/tags/{name}");
        if self.rev_parse(&tag_ref)?.is_some() {
            return Err(GitError::TagExists(name.to_string()));
        }
        match annotation {
            Some(annotation) => {
                self.shell
                    .git(["tag", "-a", name, target.as_str(), "-m", annotation.message])
                    .env("GIT_COMMITTER_NAME", &annotation.tagger.name)
                    .env("GIT_COMMITTER_EMAIL", &annotation.tagger.email)
                    .run_checked()?;
                self.rev_parse(&tag_ref)?
                    .ok_or_else(|| GitError::InvalidRef(tag_ref))
            }
            None => {
                self.shell
                    .git(["tag", name, target.as_str()])
                    .run_checked()?;
                Ok(target.clone())
            }
        }
    }

    fn add_remote(&self, name: &str, url: &str, mirror: bool) -> Result<(), GitError> {
        let invocation = self.shell.git(["remote", "add", name, url]);
        let output = invocation.run()?;
        if !output.success() {
            let combined = output.combined();
            if Self::stderr_contains(&combined, "already exists") {
                self.set_remote_url(name, url)?;
            } else {
                return Err(GitError::Command {
                    context: invocation.context(),
                    output: combined,
                });
            }
        }
        if mirror {
            self.shell
                .git(["config", &format!("remote.{name}.fetch"), "+refs/*:refs/*"])
                .run_checked()?;
            self.shell
                .git(["config", &format!("remote.{name}.mirror"), "true"])
                .run_checked()?;
            self.shell
                .git(["config", &format!("remote.{name}.prune"), "true"])
                .run_checked()?;
        }
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<bool, GitError> {
        let mirror = self
            .shell
            .git(["config", "--get", &format!("remote.{name}.mirror")])
            .run()?;
        if mirror.success() && mirror.stdout_trimmed() == "true" {
            let _ = self
                .shell
                .git(["config", "--unset", &format!("remote.{name}.fetch")])
                .run()?;
        }

        let invocation = self.shell.git(["remote", "remove", name]);
        let output = invocation.run()?;
        if output.success() {
            return Ok(true);
        }
        let combined = output.combined();
        if Self::stderr_contains(&combined, "no such remote") {
            return Ok(false);
        }
        Err(GitError::Command {
            context: invocation.context(),
            output: combined,
        })
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.shell
            .git(["remote", "set-url", name, url])
            .run_checked()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod signature_parsing {
        use super::*;

        #[test]
        fn parses_author_line() {
            let info =
                CliStore::parse_signature_line("Ada Lovelace <ada@example.com> 1700000000 +0130")
                    .expect("parse");
            assert_eq!(info.name, "Ada Lovelace");
            assert_eq!(info.email, "ada@example.com");
            assert_eq!(info.when.seconds, 1_700_000_000);
            assert_eq!(info.when.offset_minutes, 90);
        }

        #[test]
        fn parses_negative_offset() {
            let info = CliStore::parse_signature_line("A <a@b.c> 12 -0500").expect("parse");
            assert_eq!(info.when.offset_minutes, -300);
        }

        #[test]
        fn rejects_garbage() {
            assert!(CliStore::parse_signature_line("no signature here").is_err());
        }
    }

    mod commit_parsing {
        use super::*;

        #[test]
        fn parses_commit_headers() {
            let oid = Oid::new("b".repeat(40)).expect("oid");
            let raw = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                       parent aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
                       author A <a@b.c> 1700000000 +0000\n\
                       committer C <c@b.c> 1700000001 +0000\n\
                       \n\
                       message body\n";
            let snapshot = CliStore::parse_commit(oid, raw).expect("parse");
            assert_eq!(snapshot.tree.as_str(), Oid::EMPTY_TREE);
            assert_eq!(snapshot.parents.len(), 1);
            assert_eq!(snapshot.author.name, "A");
        }

        #[test]
        fn missing_tree_is_an_error() {
            let oid = Oid::new("b".repeat(40)).expect("oid");
            assert!(CliStore::parse_commit(oid, "author A <a@b.c> 1 +0000\n").is_err());
        }
    }

    #[test]
    fn date_value_formats_raw_timestamps() {
        let when = SignatureTime {
            seconds: 1_700_000_000,
            offset_minutes: -330,
        };
        assert_eq!(CliStore::date_value(&when), "1700000000 -0530");
    }
}
