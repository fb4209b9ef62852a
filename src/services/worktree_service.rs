//! Worktree Service
//!
//! Provides disposable, detached checkouts for role replays. Each role run
//! gets a fresh directory under `<state_dir>/journal/worktrees/<run_id>/`.
//! Creation never fails the caller: when isolation is unavailable the role
//! runs in the main workspace with `fallback = true`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::worktree::sanitize_path_component;
use crate::domain::models::WorktreeSession;
use crate::domain::ports::VersionControlGateway;

/// Service for managing role worktrees of one repository.
///
/// # Worktree Naming Convention
///
/// - Path: `<repo>/<state_dir>/journal/worktrees/<run_id>/<step>-<role>-<UTC ms timestamp>`
/// - Step, role and run id are sanitized to `[A-Za-z0-9_.-]`.
pub struct WorktreeService {
    vcs: Arc<dyn VersionControlGateway>,
    repo_root: PathBuf,
    state_dir: String,
}

impl WorktreeService {
    pub fn new(
        vcs: Arc<dyn VersionControlGateway>,
        repo_root: impl Into<PathBuf>,
        state_dir: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            repo_root: repo_root.into(),
            state_dir: state_dir.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Directory holding every worktree of `run_id`.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.repo_root
            .join(&self.state_dir)
            .join("journal")
            .join("worktrees")
            .join(sanitize_path_component(run_id))
    }

    fn worktree_path(&self, run_id: &str, step_id: &str, role: &str) -> PathBuf {
        let name = format!(
            "{}-{}-{}",
            sanitize_path_component(step_id),
            sanitize_path_component(role),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        self.run_dir(run_id).join(name)
    }

    /// Create an isolated checkout of HEAD for `role` replaying `step_id`.
    ///
    /// Falls back to the main workspace when the root is not version
    /// controlled, HEAD cannot be resolved, or the checkout cannot be
    /// created.
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    pub async fn create_role_worktree(
        &self,
        run_id: &str,
        step_id: &str,
        role: &str,
    ) -> WorktreeSession {
        if !self.vcs.is_repository(&self.repo_root).await {
            return self.fallback(role, "workspace is not under version control");
        }
        let Some(head) = self.vcs.head(&self.repo_root).await else {
            return self.fallback(role, "HEAD cannot be resolved");
        };

        let path = self.worktree_path(run_id, step_id, role);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return self.fallback(
                    role,
                    format!("cannot create {}: {e}", parent.display()),
                );
            }
        }

        match self.vcs.worktree_add(&self.repo_root, &path, &head).await {
            Ok(()) => {
                info!(role, step_id, path = %path.display(), "Created role worktree");
                WorktreeSession::isolated(role, path)
            }
            Err(e) => self.fallback(role, e.to_string()),
        }
    }

    fn fallback(&self, role: &str, reason: impl Into<String>) -> WorktreeSession {
        let reason = reason.into();
        warn!(role, reason = %reason, "Role worktree unavailable, using main workspace");
        WorktreeSession::fallback(role, &self.repo_root, reason)
    }

    /// Remove a role worktree. Never fails; fallback sessions are left alone.
    ///
    /// When `worktree remove --force` fails, the directory is deleted directly
    /// and stale worktree metadata is pruned.
    #[instrument(skip(self, session), fields(role = %session.role, path = %session.path.display()))]
    pub async fn remove_role_worktree(&self, session: &WorktreeSession) {
        if !session.created || session.fallback {
            return;
        }

        match self.vcs.worktree_remove(&self.repo_root, &session.path).await {
            Ok(()) => debug!("Removed role worktree"),
            Err(e) => {
                warn!(error = %e, "worktree remove failed, deleting directory");
                if session.path.exists() {
                    if let Err(e) = tokio::fs::remove_dir_all(&session.path).await {
                        warn!(error = %e, "Failed to delete role worktree directory");
                    }
                }
                let prune = vec!["worktree".to_string(), "prune".to_string()];
                let output = self.vcs.run(&self.repo_root, &prune).await;
                if !output.success() {
                    warn!(error = %output.failure_message(), "worktree prune failed");
                }
            }
        }
    }
}
