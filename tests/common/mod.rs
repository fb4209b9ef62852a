//! Common test utilities for integration tests
//!
//! Provides throwaway git repositories and small filesystem helpers shared
//! across the integration test files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use warden::adapters::GitGateway;

pub const STATE_DIR: &str = ".warden";

/// Setup test logging
///
/// Initializes a tracing subscriber writing to the test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Run git in `repo_path` and return trimmed stdout, panicking on failure.
pub fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("Failed to run git command");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Create a git repository with one commit containing `files`.
pub fn setup_test_git_repo(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir for git repo");
    let path = dir.path().to_path_buf();

    git(&path, &["init", "-q"]);
    git(&path, &["config", "user.email", "test@test.com"]);
    git(&path, &["config", "user.name", "Test User"]);
    git(&path, &["config", "commit.gpgsign", "false"]);

    for (file, content) in files {
        write_file(&path, file, content);
    }
    git(&path, &["add", "-A"]);
    git(&path, &["commit", "-q", "--allow-empty", "-m", "initial commit"]);

    (dir, path)
}

pub fn write_file(root: &Path, relative: &str, content: impl AsRef<[u8]>) {
    let target = root.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(target, content).expect("Failed to write file");
}

pub fn read_file(root: &Path, relative: &str) -> Option<Vec<u8>> {
    std::fs::read(root.join(relative)).ok()
}

/// `git status --porcelain=v1 --untracked-files=all`, exactly as printed.
pub fn status(repo_path: &Path) -> String {
    git(
        repo_path,
        &["status", "--porcelain=v1", "--untracked-files=all"],
    )
}

pub fn gateway() -> Arc<GitGateway> {
    Arc::new(GitGateway::default())
}

/// Porcelain status without entries under the runtime-state directory.
pub fn status_outside_state(repo_path: &Path) -> String {
    status(repo_path)
        .lines()
        .filter(|line| !line.contains(&format!("{STATE_DIR}/")))
        .map(|line| format!("{line}\n"))
        .collect()
}
