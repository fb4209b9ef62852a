//! Incremental Execution Harness
//!
//! Runs a plan strictly one step at a time. Each step is handed to the
//! executor as a single-step sub-plan, verified with the step's own commands
//! and, when a contract is supplied, checked by the consistency guardian
//! before the first step and after every verified step. The first failure
//! halts the run; later steps stay `todo`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::snapshot::new_snapshot_id;
use crate::domain::models::{
    ConsistencyReport, ExecutionOptions, GateStage, GuardContract, HaltReason, HarnessReport,
    Plan, PlanStep, StepOutput, StepStatus, VerificationOutcome,
};
use crate::domain::ports::{ExecutorAdapter, VerificationRunner};
use crate::services::consistency_guardian::ConsistencyGuardian;
use crate::services::progress_tracker::ProgressTracker;

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    /// Reuse a caller-chosen run id instead of generating one
    pub run_id: Option<String>,
    /// Enables the pre-exec and post-step consistency gates
    pub contract: Option<GuardContract>,
}

impl HarnessOptions {
    pub fn with_contract(mut self, contract: GuardContract) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// New sortable run id.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    format!("run-{}", new_snapshot_id(now))
}

pub struct ExecutionHarness {
    executor: Arc<dyn ExecutorAdapter>,
    verifier: Arc<dyn VerificationRunner>,
    guardian: Option<Arc<ConsistencyGuardian>>,
    repo_root: PathBuf,
    state_dir: String,
}

/// How a single step ended.
enum StepEnd {
    Done,
    Failed { halt: HaltReason, reason: String },
}

/// Mutable state of one run.
struct RunState {
    report: HarnessReport,
    progress: ProgressTracker,
}

impl ExecutionHarness {
    pub fn new(
        executor: Arc<dyn ExecutorAdapter>,
        verifier: Arc<dyn VerificationRunner>,
        repo_root: impl Into<PathBuf>,
        state_dir: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            verifier,
            guardian: None,
            repo_root: repo_root.into(),
            state_dir: state_dir.into(),
        }
    }

    pub fn with_guardian(mut self, guardian: Arc<ConsistencyGuardian>) -> Self {
        self.guardian = Some(guardian);
        self
    }

    pub fn executor(&self) -> &Arc<dyn ExecutorAdapter> {
        &self.executor
    }

    pub fn repo_root(&self) -> &std::path::Path {
        &self.repo_root
    }

    pub fn state_dir(&self) -> &str {
        &self.state_dir
    }

    /// Execute `plan` step by step.
    ///
    /// Step failures are reported in the returned [`HarnessReport`]; an `Err`
    /// means the harness itself could not continue (invalid plan, unreadable
    /// state, guardian failure).
    #[instrument(skip(self, plan, options), fields(plan_id = %plan.id, executor = self.executor.name()))]
    pub async fn run(&self, plan: &Plan, options: HarnessOptions) -> DomainResult<HarnessReport> {
        plan.validate()?;
        let guard = match (&options.contract, &self.guardian) {
            (Some(contract), Some(guardian)) => Some((contract, guardian)),
            (Some(contract), None) => {
                return Err(DomainError::ExecutionFailed(format!(
                    "contract '{}' supplied but no consistency guardian is configured",
                    contract.id
                )))
            }
            (None, _) => None,
        };

        let started_at = Utc::now();
        let run_id = options.run_id.clone().unwrap_or_else(|| new_run_id(started_at));
        let progress_path = ProgressTracker::path_for(&self.repo_root, &self.state_dir, &run_id);
        let progress = ProgressTracker::initialize(progress_path, &run_id, plan).await?;
        info!(run_id = %run_id, steps = plan.steps.len(), "Starting run");

        let mut state = RunState {
            report: HarnessReport {
                run_id,
                plan_id: plan.id.clone(),
                completed: Vec::new(),
                failed: 0,
                halt: None,
                steps: Vec::new(),
                consistency_reports: Vec::new(),
                started_at,
                finished_at: started_at,
            },
            progress,
        };

        if let Some((contract, guardian)) = guard {
            let gate = guardian
                .evaluate_consistency(plan, contract, GateStage::PreExec)
                .await?;
            let ok = gate.ok;
            state.report.consistency_reports.push(gate);
            if !ok {
                warn!("Pre-exec consistency gate failed, aborting before any step");
                state.report.halt = Some(HaltReason::PreExecGate);
                return Ok(finish(state));
            }
        }

        for step in &plan.steps {
            let halt = self.run_step(plan, step, guard, &mut state).await?;
            if let Some(halt) = halt {
                state.report.halt = Some(halt);
                break;
            }
        }

        let report = finish(state);
        info!(
            run_id = %report.run_id,
            completed = report.completed.len(),
            failed = report.failed,
            halt = report.halt.as_ref().map(HaltReason::code),
            "Run finished"
        );
        Ok(report)
    }

    async fn run_step(
        &self,
        plan: &Plan,
        step: &PlanStep,
        guard: Option<(&GuardContract, &Arc<ConsistencyGuardian>)>,
        state: &mut RunState,
    ) -> DomainResult<Option<HaltReason>> {
        let started_at = Utc::now();
        state
            .progress
            .transition(&step.id, StepStatus::Doing, None)
            .await?;

        let mut output = StepOutput {
            step_id: step.id.clone(),
            status: StepStatus::Doing,
            executor_output: String::new(),
            artifacts: Vec::new(),
            verification: Vec::new(),
            failure: None,
            started_at,
            finished_at: started_at,
        };

        let end = match self.execute_and_verify(plan, step, guard, &mut output, state).await {
            Ok(end) => end,
            Err(e) => {
                // Leave no step stuck in `doing` when the harness itself fails.
                state
                    .progress
                    .transition(&step.id, StepStatus::Failed, Some(e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        output.finished_at = Utc::now();
        let halt = match end {
            StepEnd::Done => {
                output.status = StepStatus::Done;
                state
                    .progress
                    .transition(&step.id, StepStatus::Done, None)
                    .await?;
                state.report.completed.push(step.id.clone());
                info!(step_id = %step.id, "Step done");
                None
            }
            StepEnd::Failed { halt, reason } => {
                error!(step_id = %step.id, halt = halt.code(), reason = %reason, "Step failed, halting run");
                output.status = StepStatus::Failed;
                output.failure = Some(reason.clone());
                state
                    .progress
                    .transition(&step.id, StepStatus::Failed, Some(reason))
                    .await?;
                state.report.failed += 1;
                Some(halt)
            }
        };
        state.report.steps.push(output);
        Ok(halt)
    }

    async fn execute_and_verify(
        &self,
        plan: &Plan,
        step: &PlanStep,
        guard: Option<(&GuardContract, &Arc<ConsistencyGuardian>)>,
        output: &mut StepOutput,
        state: &mut RunState,
    ) -> DomainResult<StepEnd> {
        let sub_plan = plan.single_step(step);
        let options = ExecutionOptions::primary(&self.repo_root, &step.id);
        let executor_failed = || HaltReason::ExecutorFailed {
            step_id: step.id.clone(),
        };

        match self.executor.execute(&sub_plan, &options).await {
            Err(e) => {
                return Ok(StepEnd::Failed {
                    halt: executor_failed(),
                    reason: e.to_string(),
                })
            }
            Ok(result) => {
                output.executor_output = result.output;
                output.artifacts = result.artifacts;
                if !result.success {
                    return Ok(StepEnd::Failed {
                        halt: executor_failed(),
                        reason: "executor reported failure".to_string(),
                    });
                }
            }
        }

        if let Some(failed) = self.verify(step, output).await {
            return Ok(StepEnd::Failed {
                reason: format!(
                    "verification command `{}` failed (exit code {:?})",
                    failed.command, failed.exit_code
                ),
                halt: HaltReason::VerificationFailed {
                    step_id: step.id.clone(),
                    command: failed.command,
                },
            });
        }

        if let Some((contract, guardian)) = guard {
            let gate = guardian
                .evaluate_consistency(plan, contract, GateStage::PostStep(step.id.clone()))
                .await?;
            let reason = gate_failure(&gate);
            state.report.consistency_reports.push(gate);
            if let Some(reason) = reason {
                return Ok(StepEnd::Failed {
                    halt: HaltReason::PostStepGate {
                        step_id: step.id.clone(),
                    },
                    reason,
                });
            }
        }

        Ok(StepEnd::Done)
    }

    /// Run verification commands in order, stopping at the first failure.
    async fn verify(
        &self,
        step: &PlanStep,
        output: &mut StepOutput,
    ) -> Option<VerificationOutcome> {
        for command in &step.verification_commands {
            let outcome = self.verifier.run(&self.repo_root, command).await;
            output.verification.push(outcome.clone());
            if !outcome.success {
                return Some(outcome);
            }
        }
        None
    }
}

fn gate_failure(report: &ConsistencyReport) -> Option<String> {
    if report.ok {
        return None;
    }
    let codes: Vec<&str> = report.violations.iter().map(|v| v.code()).collect();
    Some(format!(
        "post-step consistency gate failed: {}",
        codes.join(", ")
    ))
}

fn finish(state: RunState) -> HarnessReport {
    let mut report = state.report;
    report.finished_at = Utc::now();
    report
}
