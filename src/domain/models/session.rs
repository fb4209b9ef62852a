//! Domain models for the execution session audit trail.
//!
//! An execution session record aggregates one full run: its mode, per-step
//! outputs, consistency reports, the optional multi-agent summary and the
//! optional rollback record. It is written once at session end and is
//! read-only afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consistency::ConsistencyReport;
use super::convergence::ConvergenceDecision;
use super::execution::{HaltReason, HarnessReport, StepOutput, VerificationOutcome};
use super::worktree::WorktreeSession;

/// How a session was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Primary run only.
    Incremental,
    /// Primary run followed by role replays.
    MultiAgent,
}

/// Result of one role replaying one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRunResult {
    pub role: String,
    pub step_id: String,
    pub success: bool,
    pub output: String,
    pub worktree: WorktreeSession,
    pub error: Option<String>,
}

/// Kind of cross-role disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleConflictKind {
    /// Roles disagree on success or failure.
    VoteDivergence,
    /// Roles agree on the vote but produced different output.
    OutputDivergence,
}

/// A disagreement between roles on one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConflict {
    pub step_id: String,
    pub kind: RoleConflictKind,
    pub roles: Vec<String>,
    pub message: String,
}

/// Summary of all role replays for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentSummary {
    pub run_id: String,
    pub roles: Vec<String>,
    pub fanout: usize,
    pub results: Vec<RoleRunResult>,
    pub conflicts: Vec<RoleConflict>,
    pub requires_human_gate: bool,
}

/// Record of a completed rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRecord {
    pub snapshot_id: String,
    pub attempts: u32,
    pub verification: Vec<VerificationOutcome>,
    pub restored_at: DateTime<Utc>,
}

/// The permanent audit record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSessionRecord {
    pub session_id: String,
    pub mode: ExecutionMode,
    pub plan_id: String,
    pub completed: Vec<String>,
    pub failed: usize,
    pub halt: Option<HaltReason>,
    pub steps: Vec<StepOutput>,
    pub consistency_reports: Vec<ConsistencyReport>,
    #[serde(default)]
    pub convergence: Vec<ConvergenceDecision>,
    pub multi_agent: Option<MultiAgentSummary>,
    pub rollback: Option<RollbackRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionSessionRecord {
    /// Build a record from a finished harness run.
    pub fn from_report(report: HarnessReport, multi_agent: Option<MultiAgentSummary>) -> Self {
        let mode = if multi_agent.is_some() {
            ExecutionMode::MultiAgent
        } else {
            ExecutionMode::Incremental
        };
        Self {
            session_id: report.run_id,
            mode,
            plan_id: report.plan_id,
            completed: report.completed,
            failed: report.failed,
            halt: report.halt,
            steps: report.steps,
            consistency_reports: report.consistency_reports,
            convergence: Vec::new(),
            multi_agent,
            rollback: None,
            started_at: report.started_at,
            finished_at: report.finished_at,
        }
    }

    pub fn with_rollback(mut self, rollback: RollbackRecord) -> Self {
        self.rollback = Some(rollback);
        self
    }

    pub fn with_convergence(mut self, decision: ConvergenceDecision) -> Self {
        self.convergence.push(decision);
        self
    }
}
