//! git::shell
//!
//! Plumbing command execution for one repository.
//!
//! # Architecture
//!
//! [`GitShell`] carries the injected [`GitConfig`] plus the repository's
//! path and alternate object directories; every invocation it builds runs
//! with the repository as its working directory (unless redirected into a
//! worktree) and with `GIT_ALTERNATE_OBJECT_DIRECTORIES` set when
//! alternates are configured.
//!
//! Output is captured, and on a non-zero exit the combined stdout/stderr
//! becomes the payload of [`GitError::Command`]. Long-running invocations
//! may carry a wall-clock timeout; on expiry the child is killed and
//! [`GitError::Timeout`] is raised.
//!
//! # Example
//!
//! ```ignore
//! let shell = GitShell::new(config, repo_path, alternates);
//! let head = shell
//!     .git(["rev-parse", "HEAD"])
//!     .run_checked()?;
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::GitConfig;
use crate::git::GitError;

/// How often a timed invocation polls its child for exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command runner bound to one repository.
#[derive(Debug, Clone)]
pub struct GitShell {
    config: GitConfig,
    repo_path: PathBuf,
    alternate_object_dirs: Vec<PathBuf>,
}

impl GitShell {
    /// Create a shell for the repository at `repo_path`.
    pub fn new(
        config: GitConfig,
        repo_path: impl Into<PathBuf>,
        alternate_object_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            config,
            repo_path: repo_path.into(),
            alternate_object_dirs,
        }
    }

    /// The injected configuration.
    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// The repository path this shell is bound to.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Begin building an invocation of the configured git binary.
    pub fn git<I, S>(&self, args: I) -> Invocation<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Invocation {
            shell: self,
            args: args.into_iter().map(|s| s.as_ref().to_string()).collect(),
            cwd: None,
            envs: Vec::new(),
            stdin: None,
            nice: false,
            timeout: None,
        }
    }

    fn alternates_value(&self) -> Option<String> {
        if self.alternate_object_dirs.is_empty() {
            return None;
        }
        Some(
            self.alternate_object_dirs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":"),
        )
    }
}

/// Captured result of a finished invocation.
#[derive(Debug)]
pub struct ProcessOutput {
    status: ExitStatus,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Whether the process exited zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The exit code, when the process exited normally.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Combined stdout and stderr, lossily decoded. This is what error
    /// payloads carry.
    pub fn combined(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }

    /// Standard output, lossily decoded and trimmed.
    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// One git invocation under construction.
#[derive(Debug)]
pub struct Invocation<'a> {
    shell: &'a GitShell,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin: Option<Vec<u8>>,
    nice: bool,
    timeout: Option<Duration>,
}

impl Invocation<'_> {
    /// Run in `dir` instead of the repository path.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Add a set of environment variables.
    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        for (k, v) in vars {
            self.envs.push((k.clone(), v.clone()));
        }
        self
    }

    /// Feed `bytes` to the child's standard input.
    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Run under `nice`.
    pub fn nice(mut self, nice: bool) -> Self {
        self.nice = nice;
        self
    }

    /// Kill the child and fail if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Human-readable description of the invocation, used in errors.
    pub fn context(&self) -> String {
        format!("git {}", self.args.join(" "))
    }

    /// Spawn without waiting, with stdout (and optionally stdin) piped.
    /// Used by the streaming consumers that drain output incrementally.
    pub fn spawn_piped(&self, want_stdin: bool) -> Result<Child, GitError> {
        let mut command = self.build();
        command
            .stdin(if want_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.spawn().map_err(|e| self.spawn_error(e))
    }

    /// Run to completion, capturing output. The exit status is preserved in
    /// the result; use [`run_checked`](Self::run_checked) to turn non-zero
    /// exits into errors.
    pub fn run(&self) -> Result<ProcessOutput, GitError> {
        let mut command = self.build();
        command
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        // The writer runs on its own thread so a child that fills its
        // output pipe before draining stdin cannot deadlock us.
        if let Some(bytes) = self.stdin.clone() {
            if let Some(mut handle) = child.stdin.take() {
                thread::spawn(move || {
                    let _ = handle.write_all(&bytes);
                });
            }
        }

        let stdout_reader = Self::drain(child.stdout.take());
        let stderr_reader = Self::drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => self.wait_with_deadline(&mut child, limit)?,
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Run to completion and require a zero exit, returning stdout.
    pub fn run_checked(&self) -> Result<Vec<u8>, GitError> {
        let output = self.run()?;
        if !output.success() {
            return Err(GitError::Command {
                context: self.context(),
                output: output.combined(),
            });
        }
        Ok(output.stdout)
    }

    fn build(&self) -> Command {
        let bin = &self.shell.config.bin_path;
        let mut command = if self.nice {
            let mut c = Command::new("nice");
            c.arg(bin);
            c
        } else {
            Command::new(bin)
        };

        command.args(&self.args);
        command.current_dir(self.cwd.as_deref().unwrap_or(&self.shell.repo_path));

        if let Some(alternates) = self.shell.alternates_value() {
            command.env("GIT_ALTERNATE_OBJECT_DIRECTORIES", alternates);
        }
        for (k, v) in &self.envs {
            command.env(k, v);
        }

        command
    }

    fn spawn_error(&self, e: std::io::Error) -> GitError {
        GitError::Command {
            context: self.context(),
            output: format!("failed to spawn: {e}"),
        }
    }

    fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = pipe {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        })
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        limit: Duration,
    ) -> Result<ExitStatus, GitError> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitError::Timeout {
                    context: self.context(),
                    timeout: limit,
                });
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A shell whose "git" is actually `sh`, so tests exercise the runner
    /// without requiring a repository.
    fn sh_shell(dir: &TempDir) -> GitShell {
        let config = GitConfig {
            bin_path: PathBuf::from("sh"),
            ..GitConfig::default()
        };
        GitShell::new(config, dir.path(), Vec::new())
    }

    #[test]
    fn captures_stdout() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let out = shell
            .git(["-c", "printf hello"])
            .run_checked()
            .expect("run");
        assert_eq!(out, b"hello");
    }

    #[test]
    fn nonzero_exit_is_a_command_error_with_output() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let err = shell
            .git(["-c", "echo boom >&2; exit 3"])
            .run_checked()
            .expect_err("should fail");
        match err {
            GitError::Command { output, .. } => assert!(output.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn run_preserves_exit_code() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let output = shell.git(["-c", "exit 7"]).run().expect("run");
        assert!(!output.success());
        assert_eq!(output.code(), Some(7));
    }

    #[test]
    fn stdin_is_fed_to_the_child() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let out = shell
            .git(["-c", "cat"])
            .stdin_bytes(&b"piped input"[..])
            .run_checked()
            .expect("run");
        assert_eq!(out, b"piped input");
    }

    #[test]
    fn environment_reaches_the_child() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let out = shell
            .git(["-c", "printf '%s' \"$PROBE\""])
            .env("PROBE", "value-42")
            .run_checked()
            .expect("run");
        assert_eq!(out, b"value-42");
    }

    #[test]
    fn timeout_kills_the_child() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);

        let err = shell
            .git(["-c", "sleep 5"])
            .timeout(Some(Duration::from_millis(100)))
            .run()
            .expect_err("should time out");
        assert!(matches!(err, GitError::Timeout { .. }));
    }

    #[test]
    fn current_dir_overrides_repo_path() {
        let repo = TempDir::new().expect("temp dir");
        let elsewhere = TempDir::new().expect("temp dir");
        let shell = sh_shell(&repo);

        let out = shell
            .git(["-c", "pwd"])
            .current_dir(elsewhere.path())
            .run_checked()
            .expect("run");
        let pwd = String::from_utf8_lossy(&out);
        assert!(pwd.trim().ends_with(
            elsewhere
                .path()
                .file_name()
                .expect("dir name")
                .to_str()
                .expect("utf8")
        ));
    }

    #[test]
    fn context_names_the_invocation() {
        let dir = TempDir::new().expect("temp dir");
        let shell = sh_shell(&dir);
        let invocation = shell.git(["rev-parse", "HEAD"]);
        assert_eq!(invocation.context(), "git rev-parse HEAD");
    }
}
