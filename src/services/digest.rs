//! Content digests shared by snapshots and fingerprints.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::errors::{DomainError, DomainResult};

/// Full hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file, or `None` when it does not exist.
pub async fn file_sha256(path: &Path) -> DomainResult<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(sha256_hex(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::io(path, e)),
    }
}
