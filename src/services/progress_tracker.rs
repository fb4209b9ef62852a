//! Per-run step progress, persisted after every transition.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::worktree::sanitize_path_component;
use crate::domain::models::{Plan, StepProgress, StepStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressFile {
    run_id: String,
    plan_id: String,
    steps: Vec<StepProgress>,
}

/// Progress file of one run: `<state_dir>/progress/<run_id>.json`.
pub struct ProgressTracker {
    path: PathBuf,
    file: ProgressFile,
}

impl ProgressTracker {
    pub fn path_for(repo_root: &Path, state_dir: &str, run_id: &str) -> PathBuf {
        repo_root
            .join(state_dir)
            .join("progress")
            .join(format!("{}.json", sanitize_path_component(run_id)))
    }

    /// Start tracking `plan` with every step `todo`, and persist immediately.
    pub async fn initialize(path: PathBuf, run_id: &str, plan: &Plan) -> DomainResult<Self> {
        let now = Utc::now();
        let tracker = Self {
            path,
            file: ProgressFile {
                run_id: run_id.to_string(),
                plan_id: plan.id.clone(),
                steps: plan
                    .steps
                    .iter()
                    .map(|step| StepProgress {
                        step_id: step.id.clone(),
                        status: StepStatus::Todo,
                        updated_at: now,
                        note: None,
                    })
                    .collect(),
            },
        };
        tracker.persist().await?;
        Ok(tracker)
    }

    /// Read a persisted progress file.
    pub async fn load(path: &Path) -> DomainResult<Vec<StepProgress>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::io(path, e))?;
        let file: ProgressFile = serde_json::from_slice(&bytes)?;
        Ok(file.steps)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[StepProgress] {
        &self.file.steps
    }

    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.file
            .steps
            .iter()
            .find(|p| p.step_id == step_id)
            .map(|p| p.status)
    }

    /// Move a step along `todo -> doing -> {done, failed}` and persist.
    pub async fn transition(
        &mut self,
        step_id: &str,
        status: StepStatus,
        note: Option<String>,
    ) -> DomainResult<()> {
        let entry = self
            .file
            .steps
            .iter_mut()
            .find(|p| p.step_id == step_id)
            .ok_or_else(|| {
                DomainError::ExecutionFailed(format!("step '{step_id}' is not part of this run"))
            })?;

        let allowed = matches!(
            (entry.status, status),
            (StepStatus::Todo, StepStatus::Doing)
                | (StepStatus::Doing, StepStatus::Done | StepStatus::Failed)
        );
        if !allowed {
            return Err(DomainError::ExecutionFailed(format!(
                "step '{step_id}' cannot move from {:?} to {status:?}",
                entry.status
            )));
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        entry.note = note;
        debug!(step_id, status = ?status, "Step progress updated");
        self.persist().await
    }

    async fn persist(&self) -> DomainResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| DomainError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| DomainError::io(&self.path, e))
    }
}
