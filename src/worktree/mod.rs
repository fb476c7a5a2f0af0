//! worktree
//!
//! Ephemeral, detached worktrees for workflows that need a checkout.
//!
//! # Lifecycle
//!
//! A worktree lives for exactly one [`WorktreeManager::with_worktree`]
//! call. Cleanup is owned by an RAII guard: the worktree root and, once
//! resolved, its internal git-dir are removed on every exit path -
//! success, error, or panic inside the body. Removal is recursive and
//! idempotent.
//!
//! # Sparse checkout
//!
//! Passing a file list (including an explicitly empty one) creates the
//! worktree without checkout, enables `core.sparseCheckout`, writes the
//! list into the worktree's `info/sparse-checkout`, and only then checks
//! the requested ref out detached. An empty list means "sparse checkout
//! with no files", which is not the same as no sparse checkout at all: a
//! changeset that only adds files needs exactly that.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::git::shell::GitShell;
use crate::git::GitError;

/// Creates and tears down ephemeral worktrees for one repository.
pub struct WorktreeManager<'a> {
    shell: &'a GitShell,
}

impl<'a> WorktreeManager<'a> {
    pub fn new(shell: &'a GitShell) -> Self {
        Self { shell }
    }

    /// Run `body` with a detached worktree checked out at `branch`.
    ///
    /// The worktree (and its git-dir, once known) is removed when `body`
    /// returns, whatever the outcome.
    pub fn with_worktree<T, F>(
        &self,
        path: &Path,
        branch: &str,
        sparse_files: Option<&[String]>,
        env: &HashMap<String, String>,
        body: F,
    ) -> Result<T, GitError>
    where
        F: FnOnce(&Path) -> Result<T, GitError>,
    {
        let mut guard = WorktreeGuard::new(path.to_path_buf());
        let path_arg = path.to_string_lossy().into_owned();

        match sparse_files {
            Some(files) => {
                self.shell
                    .git(["worktree", "add", "--detach", "--no-checkout", path_arg.as_str()])
                    .envs(env)
                    .run_checked()?;

                let git_dir_raw = self
                    .shell
                    .git(["rev-parse", "--git-dir"])
                    .current_dir(path)
                    .run_checked()?;
                let git_dir = resolve_git_dir(path, &String::from_utf8_lossy(&git_dir_raw));
                guard.record_git_dir(git_dir.clone());

                self.configure_sparse_checkout(&git_dir, files)?;

                self.shell
                    .git(["checkout", "--detach", branch])
                    .current_dir(path)
                    .envs(env)
                    .run_checked()?;
            }
            None => {
                self.shell
                    .git(["worktree", "add", "--detach", path_arg.as_str(), branch])
                    .envs(env)
                    .run_checked()?;
            }
        }

        body(path)
        // guard drops here, removing the worktree on every exit path
    }

    /// Checking out a large repository just to apply a small change is
    /// expensive; sparse checkout restricts the worktree to the files the
    /// workflow touches.
    fn configure_sparse_checkout(
        &self,
        worktree_git_dir: &Path,
        files: &[String],
    ) -> Result<(), GitError> {
        self.shell
            .git(["config", "core.sparseCheckout", "true"])
            .run_checked()?;

        if files.is_empty() {
            return Ok(());
        }

        let info_dir = worktree_git_dir.join("info");
        fs::create_dir_all(&info_dir)?;
        let mut contents = files.join("\n");
        contents.push('\n');
        fs::write(info_dir.join("sparse-checkout"), contents)?;
        Ok(())
    }
}

/// `rev-parse --git-dir` answers relative to its working directory.
fn resolve_git_dir(worktree: &Path, raw: &str) -> PathBuf {
    let git_dir = PathBuf::from(raw.trim());
    if git_dir.is_absolute() {
        git_dir
    } else {
        worktree.join(git_dir)
    }
}

/// Removes the worktree's directories when dropped.
struct WorktreeGuard {
    root: PathBuf,
    git_dir: Option<PathBuf>,
}

impl WorktreeGuard {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            git_dir: None,
        }
    }

    fn record_git_dir(&mut self, git_dir: PathBuf) {
        self.git_dir = Some(git_dir);
    }

    fn remove(path: &Path) {
        match fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove worktree dir"),
        }
    }
}

impl Drop for WorktreeGuard {
    fn drop(&mut self) {
        Self::remove(&self.root);
        if let Some(git_dir) = &self.git_dir {
            Self::remove(git_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn guard_removes_root_and_git_dir() {
        let base = TempDir::new().expect("temp dir");
        let root = base.path().join("wt");
        let git_dir = base.path().join("git-dir");
        fs::create_dir_all(root.join("nested")).expect("create root");
        fs::create_dir_all(&git_dir).expect("create git dir");

        {
            let mut guard = WorktreeGuard::new(root.clone());
            guard.record_git_dir(git_dir.clone());
        }

        assert!(!root.exists());
        assert!(!git_dir.exists());
    }

    #[test]
    fn guard_tolerates_already_absent_paths() {
        let base = TempDir::new().expect("temp dir");
        let root = base.path().join("never-created");

        let mut guard = WorktreeGuard::new(root.clone());
        guard.record_git_dir(base.path().join("also-never-created"));
        drop(guard);

        assert!(!root.exists());
    }

    #[test]
    fn relative_git_dir_is_anchored_to_the_worktree() {
        let resolved = resolve_git_dir(Path::new("/repo/wt"), ".git/worktrees/wt\n");
        assert_eq!(resolved, Path::new("/repo/wt/.git/worktrees/wt"));
    }

    #[test]
    fn absolute_git_dir_is_kept() {
        let resolved = resolve_git_dir(Path::new("/repo/wt"), "/repo/worktrees/wt");
        assert_eq!(resolved, Path::new("/repo/worktrees/wt"));
    }
}
