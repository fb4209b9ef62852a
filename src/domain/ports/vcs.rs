//! Version control gateway port.
//!
//! Every VCS interaction of the core goes through this trait. Implementors
//! provide [`VersionControlGateway::run`]; the typed helpers are built on top
//! of it and turn non-zero exits into [`DomainError::VcsFailure`]. Test doubles
//! can override individual helpers instead of emulating raw command output.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};

/// Captured result of a subprocess invocation.
///
/// Spawn failures and timeouts are encoded here rather than raised, so a
/// caller always receives a structured outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub spawn_error: Option<String>,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.spawn_error.is_none() && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Human-readable failure description.
    pub fn failure_message(&self) -> String {
        if let Some(err) = &self.spawn_error {
            return format!("failed to spawn: {err}");
        }
        if self.timed_out {
            return format!("timed out after {}ms", self.duration_ms);
        }
        let stderr = self.stderr_lossy();
        let stderr = stderr.trim();
        match self.exit_code {
            Some(code) if stderr.is_empty() => format!("exited with code {code}"),
            Some(code) => format!("exited with code {code}: {stderr}"),
            None => format!("terminated by signal: {stderr}"),
        }
    }
}

/// Split NUL-separated command output into non-empty strings.
pub fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Pathspec selecting the whole tree except `excluded`.
pub fn excluding(excluded: &str) -> Vec<String> {
    let excluded = excluded.trim_start_matches("./").trim_end_matches('/');
    vec![
        "--".to_string(),
        ".".to_string(),
        format!(":(exclude){excluded}"),
    ]
}

/// Which side of the repository a patch is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTarget {
    WorkingTree,
    Index,
}

#[async_trait]
pub trait VersionControlGateway: Send + Sync {
    /// Run one VCS command in `cwd`.
    async fn run(&self, cwd: &Path, args: &[String]) -> CommandOutput;

    /// Run and require a zero exit.
    async fn run_checked(&self, cwd: &Path, args: &[String]) -> DomainResult<CommandOutput> {
        let output = self.run(cwd, args).await;
        if output.success() {
            Ok(output)
        } else {
            Err(DomainError::VcsFailure {
                command: args.join(" "),
                message: output.failure_message(),
            })
        }
    }

    /// Binary diff of the working tree (`cached = false`) or the index,
    /// leaving out everything under `excluded`.
    async fn diff(&self, cwd: &Path, cached: bool, excluded: &str) -> DomainResult<Vec<u8>> {
        let mut args = vec!["diff".to_string()];
        if cached {
            args.push("--cached".to_string());
        }
        args.push("--binary".to_string());
        args.extend(excluding(excluded));
        Ok(self.run_checked(cwd, &args).await?.stdout)
    }

    async fn apply(&self, cwd: &Path, patch: &Path, target: ApplyTarget) -> DomainResult<()> {
        let mut args = vec!["apply".to_string()];
        if target == ApplyTarget::Index {
            args.push("--cached".to_string());
        }
        args.push("--binary".to_string());
        args.push(patch.to_string_lossy().into_owned());
        self.run_checked(cwd, &args).await.map(|_| ())
    }

    async fn worktree_add(&self, cwd: &Path, path: &Path, head: &str) -> DomainResult<()> {
        let args = vec![
            "worktree".to_string(),
            "add".to_string(),
            "--detach".to_string(),
            path.to_string_lossy().into_owned(),
            head.to_string(),
        ];
        self.run_checked(cwd, &args).await.map(|_| ())
    }

    async fn worktree_remove(&self, cwd: &Path, path: &Path) -> DomainResult<()> {
        let args = vec![
            "worktree".to_string(),
            "remove".to_string(),
            "--force".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        self.run_checked(cwd, &args).await.map(|_| ())
    }

    /// Porcelain v1 status including every untracked file.
    async fn status(&self, cwd: &Path) -> DomainResult<String> {
        let args = vec![
            "status".to_string(),
            "--porcelain=v1".to_string(),
            "--untracked-files=all".to_string(),
        ];
        Ok(self.run_checked(cwd, &args).await?.stdout_lossy())
    }

    /// Current HEAD commit, or `None` when it cannot be resolved.
    async fn head(&self, cwd: &Path) -> Option<String> {
        let args = vec!["rev-parse".to_string(), "HEAD".to_string()];
        let output = self.run(cwd, &args).await;
        if !output.success() {
            return None;
        }
        let head = output.stdout_lossy().trim().to_string();
        (!head.is_empty()).then_some(head)
    }

    async fn is_repository(&self, cwd: &Path) -> bool {
        let args = vec!["rev-parse".to_string(), "--is-inside-work-tree".to_string()];
        let output = self.run(cwd, &args).await;
        output.success() && output.stdout_lossy().trim() == "true"
    }

    /// Untracked, non-ignored files relative to `cwd`.
    async fn untracked_files(&self, cwd: &Path) -> DomainResult<Vec<String>> {
        let args = vec![
            "ls-files".to_string(),
            "-z".to_string(),
            "--others".to_string(),
            "--exclude-standard".to_string(),
        ];
        Ok(split_nul(&self.run_checked(cwd, &args).await?.stdout))
    }

    /// Union of unstaged, staged and untracked paths outside `excluded`,
    /// sorted.
    async fn changed_files(&self, cwd: &Path, excluded: &str) -> DomainResult<Vec<String>> {
        let mut unstaged = vec![
            "diff".to_string(),
            "--name-only".to_string(),
            "-z".to_string(),
        ];
        unstaged.extend(excluding(excluded));
        let mut staged = vec![
            "diff".to_string(),
            "--cached".to_string(),
            "--name-only".to_string(),
            "-z".to_string(),
        ];
        staged.extend(excluding(excluded));

        let mut files: BTreeSet<String> = BTreeSet::new();
        files.extend(split_nul(&self.run_checked(cwd, &unstaged).await?.stdout));
        files.extend(split_nul(&self.run_checked(cwd, &staged).await?.stdout));
        files.extend(self.untracked_files(cwd).await?);
        Ok(files.into_iter().collect())
    }

    /// Drop `path` from the index without touching the working tree.
    async fn unstage(&self, cwd: &Path, path: &str) -> DomainResult<()> {
        let args = vec![
            "reset".to_string(),
            "-q".to_string(),
            "--".to_string(),
            path.to_string(),
        ];
        self.run_checked(cwd, &args).await.map(|_| ())
    }

    /// Reset index and tracked files to `head`.
    async fn reset_hard(&self, cwd: &Path, head: &str) -> DomainResult<()> {
        let args = vec!["reset".to_string(), "--hard".to_string(), head.to_string()];
        self.run_checked(cwd, &args).await.map(|_| ())
    }

    /// Remove untracked files and directories, sparing `excluded`.
    async fn clean(&self, cwd: &Path, excluded: &str) -> DomainResult<()> {
        let args = vec![
            "clean".to_string(),
            "-fd".to_string(),
            "-e".to_string(),
            excluded.to_string(),
        ];
        self.run_checked(cwd, &args).await.map(|_| ())
    }
}
