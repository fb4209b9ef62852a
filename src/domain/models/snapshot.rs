//! Snapshot domain model.
//!
//! A snapshot captures the three-way state of a repository: the working-tree
//! diff, the staged diff and the untracked files. Checksums are computed over
//! the serialized artifacts stored in the snapshot directory, so integrity
//! checks never depend on live repository state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const METADATA_FILE: &str = "metadata.json";
pub const WORKING_DIFF_FILE: &str = "working.diff";
pub const STAGED_DIFF_FILE: &str = "staged.diff";
pub const UNTRACKED_MANIFEST_FILE: &str = "untracked.json";
pub const UNTRACKED_DIR: &str = "untracked";

/// SHA-256 digests (hex) of the three serialized snapshot artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChecksums {
    pub working_sha256: String,
    pub staged_sha256: String,
    pub manifest_sha256: String,
}

/// Persisted metadata for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    /// Sortable timestamp id; lexicographic order is creation order.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub label: String,
    pub vcs_head: String,
    pub working_patch_ref: String,
    pub staged_patch_ref: String,
    pub untracked_manifest_ref: String,
    pub checksums: SnapshotChecksums,
}

/// One untracked file captured byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UntrackedEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// Manifest of untracked files stored alongside the diffs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrackedManifest {
    pub files: Vec<UntrackedEntry>,
}

/// The serialized components a snapshot is verified on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "component", content = "path", rename_all = "kebab-case")]
pub enum SnapshotComponent {
    WorkingDiff,
    StagedDiff,
    UntrackedManifest,
    UntrackedFile(String),
}

impl fmt::Display for SnapshotComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkingDiff => write!(f, "working diff"),
            Self::StagedDiff => write!(f, "staged diff"),
            Self::UntrackedManifest => write!(f, "untracked manifest"),
            Self::UntrackedFile(path) => write!(f, "untracked file '{path}'"),
        }
    }
}

/// Generate a new sortable snapshot id.
pub fn new_snapshot_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%dT%H%M%S%3fZ"), &suffix[..8])
}
