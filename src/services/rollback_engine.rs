//! Rollback Engine
//!
//! Restore-then-verify on top of the snapshot manager. A restore that applies
//! cleanly but leaves the repository failing its own health checks counts as
//! a failed attempt; the whole cycle is retried under a [`RetryPolicy`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RollbackRecord, VerificationOutcome};
use crate::domain::ports::VerificationRunner;
use crate::services::retry_policy::RetryPolicy;
use crate::services::snapshot_manager::SnapshotManager;

/// Options for one rollback.
#[derive(Debug, Clone)]
pub struct RollbackOptions {
    /// Directory verification commands run in
    pub cwd: PathBuf,
    pub retry: RetryPolicy,
    pub verification_commands: Vec<String>,
}

impl RollbackOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            retry: RetryPolicy::default(),
            verification_commands: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_verification(mut self, command: impl Into<String>) -> Self {
        self.verification_commands.push(command.into());
        self
    }
}

enum AttemptError {
    Restore(DomainError),
    Verification(VerificationOutcome),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            // Missing snapshots and checksum mismatches cannot heal by retrying.
            Self::Restore(e) => !e.is_fatal(),
            Self::Verification(_) => true,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restore(e) => write!(f, "restore failed: {e}"),
            Self::Verification(outcome) => write!(
                f,
                "verification command `{}` failed (exit code {:?}{})",
                outcome.command,
                outcome.exit_code,
                if outcome.timed_out { ", timed out" } else { "" }
            ),
        }
    }
}

pub struct RollbackEngine {
    snapshots: Arc<SnapshotManager>,
    verifier: Arc<dyn VerificationRunner>,
}

impl RollbackEngine {
    pub fn new(snapshots: Arc<SnapshotManager>, verifier: Arc<dyn VerificationRunner>) -> Self {
        Self {
            snapshots,
            verifier,
        }
    }

    /// Restore `snapshot_id` and run every verification command in order.
    ///
    /// Fails with the original error for an unknown or tampered snapshot and
    /// with [`DomainError::RollbackFailed`] once all attempts are used up.
    #[instrument(skip(self, options), fields(cwd = %options.cwd.display()))]
    pub async fn rollback(
        &self,
        snapshot_id: &str,
        options: &RollbackOptions,
    ) -> DomainResult<RollbackRecord> {
        let result = options
            .retry
            .execute(
                move |attempt| self.attempt(snapshot_id, options, attempt),
                AttemptError::is_retryable,
            )
            .await;

        match result {
            Ok((attempts, verification)) => {
                info!(snapshot_id, attempts, "Rollback completed");
                Ok(RollbackRecord {
                    snapshot_id: snapshot_id.to_string(),
                    attempts,
                    verification,
                    restored_at: Utc::now(),
                })
            }
            Err(failure) => match failure.error {
                AttemptError::Restore(e) if e.is_fatal() => Err(e),
                other => Err(DomainError::RollbackFailed {
                    snapshot_id: snapshot_id.to_string(),
                    attempts: failure.attempts,
                    reason: other.to_string(),
                }),
            },
        }
    }

    async fn attempt(
        &self,
        snapshot_id: &str,
        options: &RollbackOptions,
        attempt: u32,
    ) -> Result<(u32, Vec<VerificationOutcome>), AttemptError> {
        self.snapshots
            .restore_snapshot(snapshot_id)
            .await
            .map_err(AttemptError::Restore)?;

        let mut outcomes = Vec::with_capacity(options.verification_commands.len());
        for command in &options.verification_commands {
            let outcome = self.verifier.run(&options.cwd, command).await;
            if !outcome.success {
                warn!(snapshot_id, attempt, command = %command, "Post-rollback verification failed");
                return Err(AttemptError::Verification(outcome));
            }
            outcomes.push(outcome);
        }
        Ok((attempt, outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ApplyTarget, CommandOutput, VersionControlGateway};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingVcs {
        resets: AtomicU32,
    }

    #[async_trait]
    impl VersionControlGateway for CountingVcs {
        async fn run(&self, _cwd: &Path, _args: &[String]) -> CommandOutput {
            CommandOutput::default()
        }

        async fn head(&self, _cwd: &Path) -> Option<String> {
            Some("c".repeat(40))
        }

        async fn diff(
            &self,
            _cwd: &Path,
            _cached: bool,
            _excluded: &str,
        ) -> DomainResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn untracked_files(&self, _cwd: &Path) -> DomainResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn unstage(&self, _cwd: &Path, _path: &str) -> DomainResult<()> {
            Ok(())
        }

        async fn reset_hard(&self, _cwd: &Path, _head: &str) -> DomainResult<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clean(&self, _cwd: &Path, _excluded: &str) -> DomainResult<()> {
            Ok(())
        }

        async fn apply(&self, _cwd: &Path, _patch: &Path, _target: ApplyTarget) -> DomainResult<()> {
            Ok(())
        }
    }

    /// Fails the first `failures` runs, then passes.
    struct FlakyVerifier {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VerificationRunner for FlakyVerifier {
        async fn run(&self, _cwd: &Path, command: &str) -> VerificationOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let success = call >= self.failures;
            VerificationOutcome {
                command: command.to_string(),
                success,
                exit_code: Some(if success { 0 } else { 1 }),
                output: String::new(),
                timed_out: false,
                duration_ms: 1,
            }
        }
    }

    async fn setup(
        dir: &Path,
        failures: u32,
    ) -> (RollbackEngine, Arc<CountingVcs>, Arc<SnapshotManager>, String) {
        let vcs = Arc::new(CountingVcs {
            resets: AtomicU32::new(0),
        });
        let snapshots = Arc::new(SnapshotManager::new(vcs.clone(), dir, ".warden"));
        let id = snapshots.create_snapshot("pre-run").await.unwrap().id;
        let verifier = Arc::new(FlakyVerifier {
            failures,
            calls: AtomicU32::new(0),
        });
        (
            RollbackEngine::new(snapshots.clone(), verifier),
            vcs,
            snapshots,
            id,
        )
    }

    #[tokio::test]
    async fn test_rollback_succeeds_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, vcs, _, id) = setup(dir.path(), 0).await;
        let options = RollbackOptions::new(dir.path())
            .with_retry(RetryPolicy::immediate(3))
            .with_verification("cargo check");

        let record = engine.rollback(&id, &options).await.unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.verification.len(), 1);
        assert_eq!(vcs.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verification_failure_retries_whole_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, vcs, _, id) = setup(dir.path(), 1).await;
        let options = RollbackOptions::new(dir.path())
            .with_retry(RetryPolicy::immediate(3))
            .with_verification("make test");

        let record = engine.rollback(&id, &options).await.unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(vcs.resets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_raises_rollback_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, vcs, _, id) = setup(dir.path(), u32::MAX).await;
        let options = RollbackOptions::new(dir.path())
            .with_retry(RetryPolicy::immediate(1).with_retries(2))
            .with_verification("make test");

        let err = engine.rollback(&id, &options).await.unwrap_err();
        match err {
            DomainError::RollbackFailed {
                attempts, reason, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("make test"));
            }
            other => panic!("expected RollbackFailed, got {other:?}"),
        }
        assert_eq!(vcs.resets.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tampered_snapshot_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, vcs, snapshots, id) = setup(dir.path(), 0).await;
        std::fs::write(
            snapshots.snapshots_dir().join(&id).join("staged.diff"),
            "tampered",
        )
        .unwrap();

        let options = RollbackOptions::new(dir.path()).with_retry(RetryPolicy::immediate(5));
        let err = engine.rollback(&id, &options).await.unwrap_err();
        assert!(matches!(err, DomainError::ChecksumMismatch { .. }));
        assert_eq!(vcs.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_snapshot_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _, _, _) = setup(dir.path(), 0).await;
        let options = RollbackOptions::new(dir.path());
        let err = engine.rollback("missing-id", &options).await.unwrap_err();
        assert!(matches!(err, DomainError::SnapshotNotFound(_)));
    }
}
