//! JSON file fingerprint store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::worktree::sanitize_path_component;
use crate::domain::ports::{FingerprintMap, FingerprintStore};

/// Stores one `<contract_id>.json` file per contract under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash never leaves a truncated fingerprint file behind.
#[derive(Debug, Clone)]
pub struct JsonFingerprintStore {
    dir: PathBuf,
}

impl JsonFingerprintStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<repo_root>/<state_dir>/fingerprints`.
    pub fn for_repository(repo_root: &Path, state_dir: &str) -> Self {
        Self::new(repo_root.join(state_dir).join("fingerprints"))
    }

    fn path_for(&self, contract_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_path_component(contract_id)))
    }
}

#[async_trait]
impl FingerprintStore for JsonFingerprintStore {
    async fn load(&self, contract_id: &str) -> DomainResult<FingerprintMap> {
        let path = self.path_for(contract_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FingerprintMap::new()),
            Err(e) => Err(DomainError::io(path, e)),
        }
    }

    async fn save(&self, contract_id: &str, entries: &FingerprintMap) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DomainError::io(&self.dir, e))?;

        let path = self.path_for(contract_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| DomainError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| DomainError::io(&path, e))?;

        debug!(contract_id, entries = entries.len(), "Saved fingerprints");
        Ok(())
    }

    async fn reset(&self, contract_id: &str) -> DomainResult<()> {
        let path = self.path_for(contract_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::io(path, e)),
        }
    }
}
