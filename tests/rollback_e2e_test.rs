//! End-to-end: snapshot, failing run, verified rollback to the pre-run state.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    read_file, setup_test_git_repo, status_outside_state, write_file, STATE_DIR,
};
use warden::adapters::{MockExecutor, MockResponse, ShellVerificationRunner};
use warden::domain::models::{HaltReason, StepStatus};
use warden::services::{
    ExecutionHarness, HarnessOptions, ProgressTracker, RetryPolicy, RollbackEngine,
    RollbackOptions, SnapshotManager,
};
use warden::{DomainError, Plan, PlanStep};

fn verifier() -> Arc<ShellVerificationRunner> {
    Arc::new(ShellVerificationRunner::new("sh", Duration::from_secs(30)))
}

#[tokio::test]
async fn test_failed_run_rolls_back_to_pre_run_state() {
    common::setup_test_logging();
    let (_dir, path) = setup_test_git_repo(&[("src/lib.rs", "pub fn a() {}\n"), ("README.md", "readme\n")]);
    write_file(&path, "notes.txt", "work in progress\n");
    write_file(&path, "README.md", "readme, edited\n");

    let status_a = status_outside_state(&path);
    let files = ["src/lib.rs", "README.md", "notes.txt", "src/new.rs", "CHANGELOG.md"];
    let contents_a: Vec<_> = files.iter().map(|f| read_file(&path, f)).collect();

    let snapshots = Arc::new(SnapshotManager::new(common::gateway(), &path, STATE_DIR));
    let pre_run = snapshots.create_snapshot("pre-run").await.unwrap();

    let executor = Arc::new(MockExecutor::new());
    executor
        .set_response_for_step(
            "add-module",
            MockResponse::success("added module").writing("src/new.rs", "pub fn b() {}\n"),
        )
        .await;
    executor
        .set_response_for_step(
            "rewrite",
            MockResponse::success("rewrote lib")
                .writing("src/lib.rs", "broken(\n")
                .writing("CHANGELOG.md", "changes\n")
                .removing("notes.txt"),
        )
        .await;

    let plan = Plan::new(
        "refactor",
        vec![
            PlanStep::new("add-module").with_verification("test -f src/new.rs"),
            PlanStep::new("rewrite").with_verification("exit 1"),
        ],
    );
    let harness = ExecutionHarness::new(executor, verifier(), &path, STATE_DIR);
    let report = harness
        .run(&plan, HarnessOptions::default().with_run_id("e2e"))
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(report.completed.len() <= 1);
    assert_eq!(
        report.halt,
        Some(HaltReason::VerificationFailed {
            step_id: "rewrite".to_string(),
            command: "exit 1".to_string(),
        })
    );
    let progress = ProgressTracker::load(&ProgressTracker::path_for(&path, STATE_DIR, "e2e"))
        .await
        .unwrap();
    assert_eq!(progress[0].status, StepStatus::Done);
    assert_eq!(progress[1].status, StepStatus::Failed);
    assert_ne!(status_outside_state(&path), status_a);

    let engine = RollbackEngine::new(snapshots, verifier());
    let options = RollbackOptions::new(&path)
        .with_retry(RetryPolicy::immediate(2))
        .with_verification("test -f notes.txt")
        .with_verification("test ! -e src/new.rs");
    let record = engine.rollback(&pre_run.id, &options).await.unwrap();

    assert_eq!(record.attempts, 1);
    assert_eq!(record.verification.len(), 2);
    assert_eq!(status_outside_state(&path), status_a);
    let contents_after: Vec<_> = files.iter().map(|f| read_file(&path, f)).collect();
    assert_eq!(contents_after, contents_a);
    // Run progress survives the rollback.
    assert!(ProgressTracker::path_for(&path, STATE_DIR, "e2e").exists());
}

#[tokio::test]
async fn test_rollback_exhausts_when_verification_keeps_failing() {
    let (_dir, path) = setup_test_git_repo(&[("a.txt", "a\n")]);
    let snapshots = Arc::new(SnapshotManager::new(common::gateway(), &path, STATE_DIR));
    let snapshot = snapshots.create_snapshot("base").await.unwrap();

    let engine = RollbackEngine::new(snapshots, verifier());
    let options = RollbackOptions::new(&path)
        .with_retry(RetryPolicy::immediate(1).with_retries(2))
        .with_verification("test -f missing.txt");

    let err = engine.rollback(&snapshot.id, &options).await.unwrap_err();
    match err {
        DomainError::RollbackFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
}
