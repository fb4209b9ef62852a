//! Domain errors for the Warden execution-safety core.

use std::path::PathBuf;

use thiserror::Error;

use super::models::SnapshotComponent;

/// Domain-level errors that can occur in the Warden core.
///
/// Variants split into the fail-closed class (`SnapshotNotFound`,
/// `ChecksumMismatch`, `RollbackFailed`), which callers must never swallow,
/// and ordinary operational failures.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error(
        "Snapshot {snapshot_id} failed integrity check: {component} checksum mismatch \
         (expected {expected}, found {actual})"
    )]
    ChecksumMismatch {
        snapshot_id: String,
        component: SnapshotComponent,
        expected: String,
        actual: String,
    },

    #[error("Rollback to snapshot {snapshot_id} failed after {attempts} attempt(s): {reason}")]
    RollbackFailed {
        snapshot_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Version control command `{command}` failed: {message}")]
    VcsFailure { command: String, message: String },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Execution session already recorded: {0}")]
    SessionAlreadyRecorded(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Wrap an I/O error together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code for reports and session records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SnapshotNotFound(_) => "snapshot-not-found",
            Self::ChecksumMismatch { .. } => "checksum-mismatch",
            Self::RollbackFailed { .. } => "rollback-failed",
            Self::VcsFailure { .. } => "vcs-failure",
            Self::InvalidPlan(_) => "invalid-plan",
            Self::SessionAlreadyRecorded(_) => "session-already-recorded",
            Self::Io { .. } => "io-error",
            Self::SerializationError(_) => "serialization-error",
            Self::ExecutionFailed(_) => "execution-failed",
        }
    }

    /// Whether continuing after this error could corrupt repository state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SnapshotNotFound(_) | Self::ChecksumMismatch { .. } | Self::RollbackFailed { .. }
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DomainError::SnapshotNotFound("x".into()).is_fatal());
        assert!(DomainError::RollbackFailed {
            snapshot_id: "x".into(),
            attempts: 3,
            reason: "verification failed".into(),
        }
        .is_fatal());
        assert!(!DomainError::ExecutionFailed("boom".into()).is_fatal());
    }

    #[test]
    fn test_checksum_mismatch_names_component() {
        let err = DomainError::ChecksumMismatch {
            snapshot_id: "20250101T000000000Z-abcd1234".into(),
            component: SnapshotComponent::StagedDiff,
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(err.code(), "checksum-mismatch");
        assert!(err.to_string().contains("staged diff"));
    }
}
