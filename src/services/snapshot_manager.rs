//! Snapshot Manager
//!
//! Captures and restores the three-way state of a repository (working diff,
//! staged diff, untracked files) under `<state_dir>/snapshots/<id>/`.
//!
//! Restores verify every stored checksum before touching the repository and
//! fail closed on any mismatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::Config;
use crate::domain::models::snapshot::{
    new_snapshot_id, METADATA_FILE, STAGED_DIFF_FILE, UNTRACKED_DIR, UNTRACKED_MANIFEST_FILE,
    WORKING_DIFF_FILE,
};
use crate::domain::models::{
    SnapshotChecksums, SnapshotComponent, SnapshotRecord, UntrackedEntry, UntrackedManifest,
};
use crate::domain::ports::{ApplyTarget, VersionControlGateway};
use crate::services::digest::sha256_hex;

/// Whether a repository-relative path lies inside the runtime-state directory.
pub fn is_state_path(path: &str, state_dir: &str) -> bool {
    let state = state_dir.trim_start_matches("./").trim_end_matches('/');
    path == state || path.starts_with(&format!("{state}/"))
}

/// Snapshot contents whose checksums have been checked, held in memory.
struct VerifiedSnapshot {
    working: Vec<u8>,
    staged: Vec<u8>,
    untracked: Vec<(String, Vec<u8>)>,
}

/// Service owning the snapshot directories of one repository.
pub struct SnapshotManager {
    vcs: Arc<dyn VersionControlGateway>,
    repo_root: PathBuf,
    state_dir: String,
    retain: Option<usize>,
}

impl SnapshotManager {
    pub fn new(
        vcs: Arc<dyn VersionControlGateway>,
        repo_root: impl Into<PathBuf>,
        state_dir: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            repo_root: repo_root.into(),
            state_dir: state_dir.into(),
            retain: None,
        }
    }

    pub fn from_config(
        vcs: Arc<dyn VersionControlGateway>,
        repo_root: impl Into<PathBuf>,
        config: &Config,
    ) -> Self {
        Self::new(vcs, repo_root, config.state_dir.clone()).with_retention(config.snapshots.retain)
    }

    /// Keep only the newest `retain` snapshots after each create.
    pub fn with_retention(mut self, retain: Option<usize>) -> Self {
        self.retain = retain;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn state_dir(&self) -> &str {
        &self.state_dir
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.repo_root.join(&self.state_dir).join("snapshots")
    }

    fn snapshot_dir(&self, id: &str) -> DomainResult<PathBuf> {
        if id.is_empty() || id.starts_with('.') || id.contains('/') || id.contains('\\') {
            return Err(DomainError::SnapshotNotFound(id.to_string()));
        }
        Ok(self.snapshots_dir().join(id))
    }

    /// Capture the current repository state.
    ///
    /// Never mutates the live repository; only writes below the snapshot root.
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    pub async fn create_snapshot(&self, label: &str) -> DomainResult<SnapshotRecord> {
        let root = self.repo_root.as_path();
        let head = self
            .vcs
            .head(root)
            .await
            .ok_or_else(|| DomainError::VcsFailure {
                command: "rev-parse HEAD".to_string(),
                message: "repository has no resolvable HEAD; commit at least once before snapshotting"
                    .to_string(),
            })?;

        let working = self.vcs.diff(root, false, &self.state_dir).await?;
        let staged = self.vcs.diff(root, true, &self.state_dir).await?;
        let untracked: Vec<String> = self
            .vcs
            .untracked_files(root)
            .await?
            .into_iter()
            .filter(|path| !is_state_path(path, &self.state_dir))
            .collect();

        let created_at = Utc::now();
        let id = new_snapshot_id(created_at);
        let final_dir = self.snapshot_dir(&id)?;
        let staging_dir = self.snapshots_dir().join(format!(".partial-{id}"));

        create_dir(&staging_dir.join(UNTRACKED_DIR)).await?;

        let mut manifest = UntrackedManifest::default();
        for path in &untracked {
            let source = root.join(path);
            let bytes = tokio::fs::read(&source)
                .await
                .map_err(|e| DomainError::io(&source, e))?;
            let target = staging_dir.join(UNTRACKED_DIR).join(path);
            if let Some(parent) = target.parent() {
                create_dir(parent).await?;
            }
            write_file(&target, &bytes).await?;
            manifest.files.push(UntrackedEntry {
                path: path.clone(),
                sha256: sha256_hex(&bytes),
                size: bytes.len() as u64,
            });
        }
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

        write_file(&staging_dir.join(WORKING_DIFF_FILE), &working).await?;
        write_file(&staging_dir.join(STAGED_DIFF_FILE), &staged).await?;
        write_file(&staging_dir.join(UNTRACKED_MANIFEST_FILE), &manifest_bytes).await?;

        let record = SnapshotRecord {
            id: id.clone(),
            created_at,
            label: label.to_string(),
            vcs_head: head,
            working_patch_ref: WORKING_DIFF_FILE.to_string(),
            staged_patch_ref: STAGED_DIFF_FILE.to_string(),
            untracked_manifest_ref: UNTRACKED_MANIFEST_FILE.to_string(),
            checksums: SnapshotChecksums {
                working_sha256: sha256_hex(&working),
                staged_sha256: sha256_hex(&staged),
                manifest_sha256: sha256_hex(&manifest_bytes),
            },
        };
        write_file(
            &staging_dir.join(METADATA_FILE),
            &serde_json::to_vec_pretty(&record)?,
        )
        .await?;

        tokio::fs::rename(&staging_dir, &final_dir)
            .await
            .map_err(|e| DomainError::io(&final_dir, e))?;

        info!(
            snapshot_id = %record.id,
            label,
            head = %record.vcs_head,
            working_bytes = working.len(),
            staged_bytes = staged.len(),
            untracked = manifest.files.len(),
            "Snapshot created"
        );

        if let Some(keep) = self.retain {
            self.prune(keep).await?;
        }

        Ok(record)
    }

    /// Load a snapshot's metadata.
    pub async fn load_snapshot(&self, id: &str) -> DomainResult<SnapshotRecord> {
        let path = self.snapshot_dir(id)?.join(METADATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::SnapshotNotFound(id.to_string()))
            }
            Err(e) => Err(DomainError::io(path, e)),
        }
    }

    /// All snapshots, newest first.
    pub async fn list_snapshots(&self) -> DomainResult<Vec<SnapshotRecord>> {
        let dir = self.snapshots_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::io(dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::io(&dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            match self.load_snapshot(&name).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(snapshot_id = %name, error = %e, "Skipping unreadable snapshot"),
            }
        }

        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    /// Recompute every checksum of a snapshot without restoring it.
    #[instrument(skip(self))]
    pub async fn verify_snapshot(&self, id: &str) -> DomainResult<SnapshotRecord> {
        let record = self.load_snapshot(id).await?;
        self.verify(&record).await?;
        Ok(record)
    }

    async fn verify(&self, record: &SnapshotRecord) -> DomainResult<VerifiedSnapshot> {
        let dir = self.snapshot_dir(&record.id)?;

        let working = read_component(&dir.join(&record.working_patch_ref)).await?;
        check(
            record,
            SnapshotComponent::WorkingDiff,
            &record.checksums.working_sha256,
            working.as_deref(),
        )?;

        let staged = read_component(&dir.join(&record.staged_patch_ref)).await?;
        check(
            record,
            SnapshotComponent::StagedDiff,
            &record.checksums.staged_sha256,
            staged.as_deref(),
        )?;

        let manifest_bytes = read_component(&dir.join(&record.untracked_manifest_ref)).await?;
        check(
            record,
            SnapshotComponent::UntrackedManifest,
            &record.checksums.manifest_sha256,
            manifest_bytes.as_deref(),
        )?;

        let manifest: UntrackedManifest =
            serde_json::from_slice(manifest_bytes.as_deref().unwrap_or_default())?;
        let mut untracked = Vec::with_capacity(manifest.files.len());
        for entry in manifest.files {
            let bytes = read_component(&dir.join(UNTRACKED_DIR).join(&entry.path)).await?;
            check(
                record,
                SnapshotComponent::UntrackedFile(entry.path.clone()),
                &entry.sha256,
                bytes.as_deref(),
            )?;
            untracked.push((entry.path, bytes.unwrap_or_default()));
        }

        debug!(snapshot_id = %record.id, "Snapshot checksums verified");
        Ok(VerifiedSnapshot {
            working: working.unwrap_or_default(),
            staged: staged.unwrap_or_default(),
            untracked,
        })
    }

    /// Restore the repository to a snapshot.
    ///
    /// Order: verify, unstage the state dir, reset to the recorded head,
    /// clean (sparing the state dir), staged diff onto the index, staged diff
    /// onto the working tree, working diff onto the working tree, then
    /// untracked files. Everything after verification works from the verified
    /// bytes, never from the snapshot directory.
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    pub async fn restore_snapshot(&self, id: &str) -> DomainResult<SnapshotRecord> {
        let record = self.load_snapshot(id).await?;
        let verified = self.verify(&record).await?;

        // The reset can delete the snapshot directory when the state dir was
        // staged, so patches are applied from copies outside the repository.
        let scratch = tempfile::Builder::new()
            .prefix("warden-restore-")
            .tempdir()
            .map_err(|e| DomainError::io(std::env::temp_dir(), e))?;
        let working = scratch.path().join(WORKING_DIFF_FILE);
        let staged = scratch.path().join(STAGED_DIFF_FILE);
        write_file(&working, &verified.working).await?;
        write_file(&staged, &verified.staged).await?;

        let root = self.repo_root.as_path();
        self.vcs.unstage(root, &self.state_dir).await?;
        self.vcs.reset_hard(root, &record.vcs_head).await?;
        self.vcs.clean(root, &self.state_dir).await?;

        if !verified.staged.is_empty() {
            self.vcs.apply(root, &staged, ApplyTarget::Index).await?;
            self.vcs.apply(root, &staged, ApplyTarget::WorkingTree).await?;
        }
        if !verified.working.is_empty() {
            self.vcs.apply(root, &working, ApplyTarget::WorkingTree).await?;
        }

        for (path, bytes) in &verified.untracked {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                create_dir(parent).await?;
            }
            write_file(&target, bytes).await?;
        }

        info!(
            snapshot_id = %record.id,
            head = %record.vcs_head,
            untracked = verified.untracked.len(),
            "Snapshot restored"
        );
        Ok(record)
    }

    /// Delete all but the newest `keep` snapshots; returns the removed ids.
    #[instrument(skip(self))]
    pub async fn prune(&self, keep: usize) -> DomainResult<Vec<String>> {
        let records = self.list_snapshots().await?;
        let mut removed = Vec::new();
        for record in records.into_iter().skip(keep) {
            let dir = self.snapshot_dir(&record.id)?;
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| DomainError::io(&dir, e))?;
            removed.push(record.id);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), keep, "Pruned old snapshots");
        }
        Ok(removed)
    }
}

fn check(
    record: &SnapshotRecord,
    component: SnapshotComponent,
    expected: &str,
    bytes: Option<&[u8]>,
) -> DomainResult<()> {
    let actual = match bytes {
        Some(bytes) => sha256_hex(bytes),
        None => "missing".to_string(),
    };
    if actual == expected {
        return Ok(());
    }
    warn!(snapshot_id = %record.id, %component, "Snapshot checksum mismatch");
    Err(DomainError::ChecksumMismatch {
        snapshot_id: record.id.clone(),
        component,
        expected: expected.to_string(),
        actual,
    })
}

async fn read_component(path: &Path) -> DomainResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::io(path, e)),
    }
}

async fn create_dir(path: &Path) -> DomainResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| DomainError::io(path, e))
}

async fn write_file(path: &Path, bytes: &[u8]) -> DomainResult<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| DomainError::io(path, e))
}
