//! Fingerprint domain model.
//!
//! A fingerprint is the content hash of a tracked artifact plus a bounded
//! history of its previous hashes. The history lets the guardian tell a
//! legitimate edit apart from a silent rollback to an older version.

use serde::{Deserialize, Serialize};

/// Maximum number of previous hashes kept per artifact.
pub const MAX_FINGERPRINT_HISTORY: usize = 20;

/// Observed state of one artifact at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactObservation {
    pub exists: bool,
    pub hash: Option<String>,
}

impl ArtifactObservation {
    pub fn present(hash: impl Into<String>) -> Self {
        Self {
            exists: true,
            hash: Some(hash.into()),
        }
    }

    pub fn absent() -> Self {
        Self {
            exists: false,
            hash: None,
        }
    }
}

/// Stored fingerprint of one artifact.
///
/// Invariant: `history` never contains `hash` and never exceeds
/// [`MAX_FINGERPRINT_HISTORY`] entries (most recent last).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintEntry {
    pub artifact: String,
    pub step_id: String,
    pub exists: bool,
    pub hash: Option<String>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl FingerprintEntry {
    /// First observation of an artifact.
    pub fn observed(
        artifact: impl Into<String>,
        step_id: impl Into<String>,
        observation: &ArtifactObservation,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            step_id: step_id.into(),
            exists: observation.exists,
            hash: observation.hash.clone(),
            history: Vec::new(),
        }
    }

    /// Whether `hash` is an older version of this artifact.
    pub fn history_contains(&self, hash: &str) -> bool {
        self.history.iter().any(|h| h == hash)
    }

    /// Fold a new observation into the entry, maintaining the history invariant.
    pub fn record(&mut self, step_id: &str, observation: &ArtifactObservation) {
        if self.hash != observation.hash {
            if let Some(previous) = self.hash.take() {
                self.history.push(previous);
            }
        }

        self.exists = observation.exists;
        self.hash = observation.hash.clone();
        self.step_id = step_id.to_string();

        if let Some(current) = &self.hash {
            self.history.retain(|h| h != current);
        }
        if self.history.len() > MAX_FINGERPRINT_HISTORY {
            let excess = self.history.len() - MAX_FINGERPRINT_HISTORY;
            self.history.drain(..excess);
        }
    }
}
