//! Integration tests for snapshot capture and restore against real git
//! repositories.

mod common;

use std::sync::Arc;

use common::{git, read_file, setup_test_git_repo, status, write_file, STATE_DIR};
use warden::domain::models::SnapshotComponent;
use warden::services::SnapshotManager;
use warden::DomainError;

const BINARY: &[u8] = &[0, 159, 146, 150, 255, 0, 1, 2];

fn dirty_repo() -> (tempfile::TempDir, std::path::PathBuf) {
    let (dir, path) = setup_test_git_repo(&[
        ("a.txt", "alpha\n"),
        ("b.txt", "bravo\n"),
        ("dir/c.txt", "charlie\n"),
    ]);
    // Unstaged edit.
    write_file(&path, "a.txt", "alpha edited\n");
    // Staged edit with a further unstaged edit on top.
    write_file(&path, "b.txt", "bravo staged\n");
    git(&path, &["add", "b.txt"]);
    write_file(&path, "b.txt", "bravo staged\nand more\n");
    // Untracked text and binary files.
    write_file(&path, "u.txt", "untracked\n");
    write_file(&path, "nested/deep/v.bin", BINARY);
    (dir, path)
}

fn contents(path: &std::path::Path) -> Vec<Option<Vec<u8>>> {
    ["a.txt", "b.txt", "dir/c.txt", "u.txt", "nested/deep/v.bin", "junk.txt"]
        .iter()
        .map(|f| read_file(path, f))
        .collect()
}

#[tokio::test]
async fn test_round_trip_restore_is_byte_identical() {
    common::setup_test_logging();
    let (_dir, path) = dirty_repo();
    let manager = SnapshotManager::new(common::gateway(), &path, STATE_DIR);

    let record = manager.create_snapshot("before mutation").await.unwrap();
    let status_before = status(&path);
    let contents_before = contents(&path);
    assert!(status_before.contains(" M a.txt"));
    assert!(status_before.contains("MM b.txt"));

    // Mutate everything: tracked, staged and untracked.
    std::fs::remove_file(path.join("a.txt")).unwrap();
    write_file(&path, "dir/c.txt", "charlie clobbered\n");
    write_file(&path, "junk.txt", "junk\n");
    std::fs::remove_file(path.join("u.txt")).unwrap();
    git(&path, &["add", "-A"]);
    assert_ne!(status(&path), status_before);

    manager.restore_snapshot(&record.id).await.unwrap();

    assert_eq!(status(&path), status_before);
    assert_eq!(contents(&path), contents_before);
    assert_eq!(read_file(&path, "nested/deep/v.bin").unwrap(), BINARY);
}

#[tokio::test]
async fn test_untracked_state_dir_is_never_captured() {
    let (_dir, path) = dirty_repo();
    write_file(&path, ".warden/progress/run.json", "{}");
    let manager = SnapshotManager::new(common::gateway(), &path, STATE_DIR);

    let record = manager.create_snapshot("s").await.unwrap();
    let manifest = std::fs::read_to_string(
        manager
            .snapshots_dir()
            .join(&record.id)
            .join(&record.untracked_manifest_ref),
    )
    .unwrap();
    assert!(manifest.contains("u.txt"));
    assert!(!manifest.contains(".warden"));

    // Restore must keep the state dir, including the snapshot itself.
    manager.restore_snapshot(&record.id).await.unwrap();
    assert!(path.join(".warden/progress/run.json").exists());
    assert!(manager.verify_snapshot(&record.id).await.is_ok());
}

#[tokio::test]
async fn test_restore_after_state_dir_was_staged() {
    let (_dir, path) = setup_test_git_repo(&[("a.txt", "alpha\n")]);
    write_file(&path, "a.txt", "alpha edited\n");
    let manager = SnapshotManager::new(common::gateway(), &path, STATE_DIR);
    let record = manager.create_snapshot("before agent").await.unwrap();
    let status_before = status(&path);

    // An agent stages everything, runtime state included.
    write_file(&path, "b.txt", "bravo\n");
    git(&path, &["add", "-A"]);
    assert!(git(&path, &["diff", "--cached", "--name-only"]).contains(".warden/"));

    manager.restore_snapshot(&record.id).await.unwrap();

    assert_eq!(status(&path), status_before);
    assert_eq!(read_file(&path, "a.txt").unwrap(), b"alpha edited\n");
    assert!(read_file(&path, "b.txt").is_none());
    // The snapshot survives and can be restored again.
    assert!(manager.verify_snapshot(&record.id).await.is_ok());
    manager.restore_snapshot(&record.id).await.unwrap();
}

#[tokio::test]
async fn test_staged_state_dir_is_left_out_of_diffs() {
    let (_dir, path) = setup_test_git_repo(&[("a.txt", "alpha\n")]);
    let manager = SnapshotManager::new(common::gateway(), &path, STATE_DIR);
    manager.create_snapshot("first").await.unwrap();

    write_file(&path, "a.txt", "alpha staged\n");
    git(&path, &["add", "-A"]);
    let second = manager.create_snapshot("second").await.unwrap();

    let staged = std::fs::read_to_string(
        manager
            .snapshots_dir()
            .join(&second.id)
            .join(&second.staged_patch_ref),
    )
    .unwrap();
    assert!(staged.contains("a.txt"));
    assert!(!staged.contains(".warden"));

    manager.restore_snapshot(&second.id).await.unwrap();
    let index = git(&path, &["diff", "--cached", "--name-only"]);
    assert_eq!(index.trim(), "a.txt");
    assert_eq!(read_file(&path, "a.txt").unwrap(), b"alpha staged\n");
}

#[tokio::test]
async fn test_tampered_components_fail_closed() {
    let cases: [(&str, fn(&SnapshotComponent) -> bool); 4] = [
        ("working.diff", |c| *c == SnapshotComponent::WorkingDiff),
        ("staged.diff", |c| *c == SnapshotComponent::StagedDiff),
        ("untracked.json", |c| *c == SnapshotComponent::UntrackedManifest),
        ("untracked/u.txt", |c| {
            *c == SnapshotComponent::UntrackedFile("u.txt".to_string())
        }),
    ];

    for (file, expected) in cases {
        let (_dir, path) = dirty_repo();
        let manager = Arc::new(SnapshotManager::new(common::gateway(), &path, STATE_DIR));
        let record = manager.create_snapshot("tamper").await.unwrap();

        // Move the repository away from the snapshot state.
        write_file(&path, "dir/c.txt", "changed after snapshot\n");
        let status_before = status(&path);
        let contents_before = contents(&path);

        let target = manager.snapshots_dir().join(&record.id).join(file);
        let mut bytes = std::fs::read(&target).unwrap();
        bytes.extend_from_slice(b"tampered");
        std::fs::write(&target, bytes).unwrap();

        let err = manager.restore_snapshot(&record.id).await.unwrap_err();
        match &err {
            DomainError::ChecksumMismatch { component, .. } => {
                assert!(expected(component), "{file}: wrong component {component}");
            }
            other => panic!("{file}: expected ChecksumMismatch, got {other:?}"),
        }
        assert!(err.is_fatal());
        assert_eq!(status(&path), status_before, "{file}: repository was mutated");
        assert_eq!(contents(&path), contents_before, "{file}: files were mutated");
    }
}

#[tokio::test]
async fn test_repository_without_head_cannot_be_snapshotted() {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    let manager = SnapshotManager::new(common::gateway(), dir.path(), STATE_DIR);
    let err = manager.create_snapshot("no head").await.unwrap_err();
    assert!(matches!(err, DomainError::VcsFailure { .. }));
}
