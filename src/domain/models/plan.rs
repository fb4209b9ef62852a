//! Plan domain model.
//!
//! A plan is an ordered list of steps the executor applies one at a time.
//! Plans are immutable once a run starts; the harness hands the executor a
//! single-step sub-plan per step.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Risk classification of a plan step.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical steps need multi-party agreement.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// A single step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Repository-relative paths this step is expected to produce or keep.
    #[serde(default)]
    pub expected_artifacts: Vec<String>,
    /// Shell commands that must all exit zero for the step to count as done.
    #[serde(default)]
    pub verification_commands: Vec<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            expected_artifacts: Vec::new(),
            verification_commands: Vec::new(),
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.expected_artifacts.push(artifact.into());
        self
    }

    pub fn with_verification(mut self, command: impl Into<String>) -> Self {
        self.verification_commands.push(command.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An ordered execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(id: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            id: id.into(),
            summary: String::new(),
            steps,
        }
    }

    /// Load a plan from a YAML or JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DomainError::io(path, e))?;
        let plan: Self = serde_yaml::from_str(&raw)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reject empty plans and missing or duplicate step ids.
    pub fn validate(&self) -> DomainResult<()> {
        if self.steps.is_empty() {
            return Err(DomainError::InvalidPlan(format!(
                "plan '{}' has no steps",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(DomainError::InvalidPlan(format!(
                    "plan '{}' contains a step with an empty id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DomainError::InvalidPlan(format!(
                    "plan '{}' contains duplicate step id '{}'",
                    self.id, step.id
                )));
            }
        }
        Ok(())
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Sub-plan containing only `step`, handed to the executor.
    pub fn single_step(&self, step: &PlanStep) -> Plan {
        Plan {
            id: format!("{}:{}", self.id, step.id),
            summary: step.description.clone(),
            steps: vec![step.clone()],
        }
    }

    /// Every expected artifact across all steps, with the first step declaring it.
    pub fn expected_artifacts(&self) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for step in &self.steps {
            for artifact in &step.expected_artifacts {
                if seen.insert(artifact.clone()) {
                    out.push((artifact.clone(), step.id.clone()));
                }
            }
        }
        out
    }
}

/// Per-step execution status tracked by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Todo,
    Doing,
    Done,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One entry of the progress file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: StepStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
