//! Session Journal
//!
//! Append-only store of [`ExecutionSessionRecord`]s under
//! `<state_dir>/sessions/<session_id>.json`. A record is written once and is
//! never overwritten.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::worktree::sanitize_path_component;
use crate::domain::models::ExecutionSessionRecord;

pub struct SessionJournal {
    dir: PathBuf,
}

impl SessionJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_repository(repo_root: &Path, state_dir: &str) -> Self {
        Self::new(repo_root.join(state_dir).join("sessions"))
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_path_component(session_id)))
    }

    /// Persist `record`. Fails with `SessionAlreadyRecorded` if it exists.
    #[instrument(skip(self, record), fields(session_id = %record.session_id))]
    pub async fn write(&self, record: &ExecutionSessionRecord) -> DomainResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DomainError::io(&self.dir, e))?;

        let path = self.record_path(&record.session_id);
        let bytes = serde_json::to_vec_pretty(record)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DomainError::SessionAlreadyRecorded(
                    record.session_id.clone(),
                ))
            }
            Err(e) => return Err(DomainError::io(&path, e)),
        };
        file.write_all(&bytes)
            .await
            .map_err(|e| DomainError::io(&path, e))?;
        file.flush().await.map_err(|e| DomainError::io(&path, e))?;

        info!(path = %path.display(), "Session recorded");
        Ok(path)
    }

    pub async fn load(&self, session_id: &str) -> DomainResult<ExecutionSessionRecord> {
        let path = self.record_path(session_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DomainError::io(&path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every readable record, oldest first. Unreadable files are skipped.
    pub async fn list(&self) -> DomainResult<Vec<ExecutionSessionRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<ExecutionSessionRecord>(&bytes)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(record) => records.push(record),
                Err(error) => warn!(path = %path.display(), error = %error, "Skipping unreadable session record"),
            }
        }

        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(records)
    }
}
