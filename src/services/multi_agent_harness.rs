//! Multi-Agent Harness
//!
//! Replays every completed step of a primary run once per configured role,
//! each in its own disposable worktree and in dry-run mode. Role runs are
//! batched: up to `fanout` run concurrently, batches run one after another.
//! Disagreement between roles is surfaced for a human gate but never fails
//! the primary run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ExecutionOptions, ExecutionSessionRecord, HarnessReport, MultiAgentConfig, MultiAgentSummary,
    Plan, RoleConflict, RoleConflictKind, RoleRunResult,
};
use crate::services::execution_harness::{ExecutionHarness, HarnessOptions};
use crate::services::worktree_service::WorktreeService;

/// Trim, collapse whitespace runs and lowercase.
pub fn normalize_output(output: &str) -> String {
    output
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find steps on which roles disagree, either on the vote or on the output.
pub fn detect_role_conflicts(results: &[RoleRunResult]) -> Vec<RoleConflict> {
    let mut by_step: BTreeMap<&str, Vec<&RoleRunResult>> = BTreeMap::new();
    for result in results {
        by_step.entry(result.step_id.as_str()).or_default().push(result);
    }

    by_step
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter_map(|(step_id, group)| {
            let roles: Vec<String> = group.iter().map(|r| r.role.clone()).collect();
            let votes: BTreeSet<bool> = group.iter().map(|r| r.success).collect();
            if votes.len() > 1 {
                let (passed, failed): (Vec<&RoleRunResult>, Vec<&RoleRunResult>) =
                    group.iter().copied().partition(|r| r.success);
                return Some(RoleConflict {
                    step_id: step_id.to_string(),
                    kind: RoleConflictKind::VoteDivergence,
                    roles,
                    message: format!(
                        "roles disagree on step '{step_id}': succeeded [{}], failed [{}]",
                        passed.iter().map(|r| r.role.as_str()).collect::<Vec<_>>().join(", "),
                        failed.iter().map(|r| r.role.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                });
            }

            let outputs: BTreeSet<String> =
                group.iter().map(|r| normalize_output(&r.output)).collect();
            (outputs.len() > 1).then(|| RoleConflict {
                step_id: step_id.to_string(),
                kind: RoleConflictKind::OutputDivergence,
                roles,
                message: format!(
                    "roles produced {} different outputs for step '{step_id}'",
                    outputs.len()
                ),
            })
        })
        .collect()
}

pub struct MultiAgentHarness {
    harness: Arc<ExecutionHarness>,
    worktrees: Arc<WorktreeService>,
    config: MultiAgentConfig,
}

impl MultiAgentHarness {
    pub fn new(
        harness: Arc<ExecutionHarness>,
        worktrees: Arc<WorktreeService>,
        config: MultiAgentConfig,
    ) -> Self {
        Self {
            harness,
            worktrees,
            config,
        }
    }

    /// Primary run followed by role replays of every completed step.
    #[instrument(skip(self, plan, options), fields(plan_id = %plan.id))]
    pub async fn run(
        &self,
        plan: &Plan,
        options: HarnessOptions,
    ) -> DomainResult<ExecutionSessionRecord> {
        let report = self.harness.run(plan, options).await?;
        let summary = self.replay(plan, &report).await;
        Ok(ExecutionSessionRecord::from_report(report, Some(summary)))
    }

    /// Replay the completed steps of `report` for every role.
    #[instrument(skip(self, plan, report), fields(run_id = %report.run_id))]
    pub async fn replay(&self, plan: &Plan, report: &HarnessReport) -> MultiAgentSummary {
        let fanout = self.config.effective_fanout();
        let tasks: Vec<(&str, &str)> = report
            .completed
            .iter()
            .flat_map(|step_id| {
                self.config
                    .roles
                    .iter()
                    .map(move |role| (step_id.as_str(), role.as_str()))
            })
            .collect();
        info!(tasks = tasks.len(), fanout, "Replaying completed steps per role");

        let mut results = Vec::with_capacity(tasks.len());
        for batch in tasks.chunks(fanout) {
            let batch_results = join_all(
                batch
                    .iter()
                    .map(|(step_id, role)| self.run_role(plan, &report.run_id, step_id, role)),
            )
            .await;
            results.extend(batch_results);
        }

        let conflicts = detect_role_conflicts(&results);
        if !conflicts.is_empty() {
            warn!(conflicts = conflicts.len(), "Roles disagree, human gate required");
        }
        MultiAgentSummary {
            run_id: report.run_id.clone(),
            roles: self.config.roles.clone(),
            fanout,
            requires_human_gate: !conflicts.is_empty(),
            results,
            conflicts,
        }
    }

    async fn run_role(
        &self,
        plan: &Plan,
        run_id: &str,
        step_id: &str,
        role: &str,
    ) -> RoleRunResult {
        let worktree = self
            .worktrees
            .create_role_worktree(run_id, step_id, role)
            .await;

        let outcome = match plan.step(step_id) {
            Some(step) => {
                let options = ExecutionOptions::role_replay(&worktree.path, step_id, role);
                self.harness
                    .executor()
                    .execute(&plan.single_step(step), &options)
                    .await
                    .map_err(|e| e.to_string())
            }
            None => Err(format!("step '{step_id}' is not part of plan '{}'", plan.id)),
        };

        self.worktrees.remove_role_worktree(&worktree).await;

        match outcome {
            Ok(result) => RoleRunResult {
                role: role.to_string(),
                step_id: step_id.to_string(),
                success: result.success,
                output: result.output,
                worktree,
                error: None,
            },
            Err(error) => {
                warn!(role, step_id, error = %error, "Role run failed");
                RoleRunResult {
                    role: role.to_string(),
                    step_id: step_id.to_string(),
                    success: false,
                    output: String::new(),
                    worktree,
                    error: Some(error),
                }
            }
        }
    }
}
