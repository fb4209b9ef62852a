//! Execution domain model: executor I/O, verification outcomes and the
//! per-run harness report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consistency::ConsistencyReport;
use super::plan::StepStatus;

/// Options passed to an executor for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Workspace the executor must operate in.
    pub cwd: PathBuf,
    pub step_id: String,
    /// Role name for side-agent replays; `None` for the primary run.
    pub role: Option<String>,
    pub dry_run: bool,
}

impl ExecutionOptions {
    pub fn primary(cwd: impl Into<PathBuf>, step_id: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            step_id: step_id.into(),
            role: None,
            dry_run: false,
        }
    }

    pub fn role_replay(
        cwd: impl Into<PathBuf>,
        step_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            cwd: cwd.into(),
            step_id: step_id.into(),
            role: Some(role.into()),
            dry_run: true,
        }
    }
}

/// What an executor reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub artifacts: Vec<String>,
}

/// Outcome of one verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Everything recorded about one step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub step_id: String,
    pub status: StepStatus,
    pub executor_output: String,
    pub artifacts: Vec<String>,
    pub verification: Vec<VerificationOutcome>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a run stopped before finishing every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum HaltReason {
    PreExecGate,
    ExecutorFailed { step_id: String },
    VerificationFailed { step_id: String, command: String },
    PostStepGate { step_id: String },
}

impl HaltReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PreExecGate => "pre-exec-gate",
            Self::ExecutorFailed { .. } => "executor-failed",
            Self::VerificationFailed { .. } => "verification-failed",
            Self::PostStepGate { .. } => "post-step-gate",
        }
    }
}

/// Result of an incremental harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessReport {
    pub run_id: String,
    pub plan_id: String,
    /// Ids of steps marked done, in execution order.
    pub completed: Vec<String>,
    /// Number of steps marked failed.
    pub failed: usize,
    pub halt: Option<HaltReason>,
    pub steps: Vec<StepOutput>,
    pub consistency_reports: Vec<ConsistencyReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarnessReport {
    pub fn succeeded(&self) -> bool {
        self.failed == 0 && self.halt.is_none()
    }

    /// True when the pre-exec gate stopped the run before any step.
    pub fn aborted(&self) -> bool {
        matches!(self.halt, Some(HaltReason::PreExecGate))
    }
}
