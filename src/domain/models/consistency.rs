//! Consistency domain model: contracts, drift reports and violations.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Declared boundaries of a change: what may be touched and what must not be.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardContract {
    pub id: String,
    /// Path prefixes the change is allowed to touch. Empty means unrestricted.
    #[serde(default)]
    pub in_scope: Vec<String>,
    /// Path prefixes that must not be touched.
    #[serde(default)]
    pub protected_paths: Vec<String>,
}

impl GuardContract {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, prefix: impl Into<String>) -> Self {
        self.in_scope.push(prefix.into());
        self
    }

    pub fn with_protected(mut self, prefix: impl Into<String>) -> Self {
        self.protected_paths.push(prefix.into());
        self
    }

    /// Load a contract from a YAML or JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DomainError::io(path, e))?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Severity band of a drift score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

impl DriftSeverity {
    /// Band for a drift score: none (<20), low (<60), medium (<100), high.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=19 => Self::None,
            20..=59 => Self::Low,
            60..=99 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Violation severity this drift band maps to, if it warrants one.
    pub fn violation_severity(&self) -> Option<Severity> {
        match self {
            Self::Medium => Some(Severity::Medium),
            Self::High => Some(Severity::High),
            Self::None | Self::Low => None,
        }
    }
}

/// Scope and protected-path deviation of the current change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub changed_files: Vec<String>,
    pub out_of_scope: Vec<String>,
    pub protected_touches: Vec<String>,
    pub score: u32,
    pub severity: DriftSeverity,
}

/// A consistency violation found between execution steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConsistencyViolation {
    /// An artifact that previously existed is gone.
    MissingArtifact {
        severity: Severity,
        message: String,
        artifact: String,
        step_id: Option<String>,
    },
    /// An artifact silently returned to a hash from its own history.
    UnexpectedRevert {
        severity: Severity,
        message: String,
        artifact: String,
        step_id: Option<String>,
    },
    /// A previously deleted artifact outside the plan reappeared.
    GhostRevival {
        severity: Severity,
        message: String,
        artifact: String,
        step_id: Option<String>,
    },
    /// The change set drifted out of the contract's boundaries.
    ContractDrift {
        severity: Severity,
        message: String,
        score: u32,
    },
}

impl ConsistencyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingArtifact { .. } => "missing-artifact",
            Self::UnexpectedRevert { .. } => "unexpected-revert",
            Self::GhostRevival { .. } => "ghost-revival",
            Self::ContractDrift { .. } => "contract-drift",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingArtifact { severity, .. }
            | Self::UnexpectedRevert { severity, .. }
            | Self::GhostRevival { severity, .. }
            | Self::ContractDrift { severity, .. } => *severity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::MissingArtifact { message, .. }
            | Self::UnexpectedRevert { message, .. }
            | Self::GhostRevival { message, .. }
            | Self::ContractDrift { message, .. } => message,
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::MissingArtifact { artifact, .. }
            | Self::UnexpectedRevert { artifact, .. }
            | Self::GhostRevival { artifact, .. } => Some(artifact),
            Self::ContractDrift { .. } => None,
        }
    }
}

/// Where in the run a guardian evaluation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "stepId", rename_all = "kebab-case")]
pub enum GateStage {
    PreExec,
    PostStep(String),
    Manual,
}

/// Result of one guardian evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub contract_id: String,
    pub stage: GateStage,
    pub ok: bool,
    pub score: u32,
    pub violations: Vec<ConsistencyViolation>,
    pub drift: Option<DriftReport>,
    pub auto_snapshot_id: Option<String>,
    pub remediation: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub fn violations_with_code<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a ConsistencyViolation> + 'a {
        self.violations.iter().filter(move |v| v.code() == code)
    }

    pub fn has_violation(&self, code: &str) -> bool {
        self.violations_with_code(code).next().is_some()
    }
}
