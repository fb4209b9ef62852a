//! Subprocess executor.
//!
//! Hands the single-step sub-plan to a configured program as JSON on stdin.
//! The step id, role and dry-run flag are exported as `WARDEN_STEP_ID`,
//! `WARDEN_ROLE` and `WARDEN_DRY_RUN`. Reported artifacts are the step's
//! expected artifacts that exist in the workspace once the program exits.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExecutionOptions, ExecutionResult, ExecutorConfig, Plan};
use crate::domain::ports::ExecutorAdapter;
use crate::infrastructure::process::{run_command, CommandSpec};

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutorAdapter for CommandExecutor {
    fn name(&self) -> &str {
        &self.config.program
    }

    #[instrument(skip(self, plan), fields(plan_id = %plan.id, step_id = %options.step_id))]
    async fn execute(
        &self,
        plan: &Plan,
        options: &ExecutionOptions,
    ) -> DomainResult<ExecutionResult> {
        let input = serde_json::to_vec(plan)?;
        let spec = CommandSpec::new(
            &self.config.program,
            &options.cwd,
            Duration::from_secs(self.config.timeout_secs),
        )
        .args(self.config.args.iter().cloned())
        .stdin(input)
        .env("WARDEN_STEP_ID", options.step_id.clone())
        .env("WARDEN_DRY_RUN", if options.dry_run { "1" } else { "0" })
        .env("WARDEN_ROLE", options.role.clone().unwrap_or_default());

        let output = run_command(spec).await;
        if let Some(err) = output.spawn_error {
            return Err(DomainError::ExecutionFailed(format!(
                "failed to start executor '{}': {err}",
                self.config.program
            )));
        }

        let success = output.success();
        let mut text = output.stdout_lossy();
        if !success {
            let failure = output.failure_message();
            warn!(error = %failure, "Executor reported failure");
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&failure);
        }

        let artifacts = plan
            .steps
            .iter()
            .flat_map(|step| step.expected_artifacts.iter())
            .filter(|artifact| options.cwd.join(artifact.as_str()).exists())
            .cloned()
            .collect::<Vec<_>>();

        info!(success, artifacts = artifacts.len(), "Executor finished");

        Ok(ExecutionResult {
            success,
            output: text,
            artifacts,
        })
    }

    async fn is_available(&self) -> bool {
        let probe = CommandSpec::new(
            &self.config.program,
            std::env::temp_dir(),
            Duration::from_secs(5),
        )
        .args(["--version"]);
        run_command(probe).await.spawn_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PlanStep;

    fn sh_executor(script: &str) -> CommandExecutor {
        CommandExecutor::new(ExecutorConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs: 30,
        })
    }

    #[tokio::test]
    async fn test_receives_plan_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor(
            r#"cat > plan.json; printf '%s|%s|%s' "$WARDEN_STEP_ID" "$WARDEN_DRY_RUN" "$WARDEN_ROLE""#,
        );
        let plan = Plan::new("p", vec![PlanStep::new("s1").with_artifact("plan.json")]);

        let result = executor
            .execute(&plan, &ExecutionOptions::primary(dir.path(), "s1"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "s1|0|");
        assert_eq!(result.artifacts, vec!["plan.json".to_string()]);
        let written: Plan =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("plan.json")).unwrap())
                .unwrap();
        assert_eq!(written, plan);
    }

    #[tokio::test]
    async fn test_role_replay_sets_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor(r#"cat >/dev/null; printf '%s|%s' "$WARDEN_DRY_RUN" "$WARDEN_ROLE""#);
        let plan = Plan::new("p", vec![PlanStep::new("s1")]);

        let result = executor
            .execute(
                &plan,
                &ExecutionOptions::role_replay(dir.path(), "s1", "reviewer"),
            )
            .await
            .unwrap();
        assert_eq!(result.output, "1|reviewer");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_unsuccessful() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor("cat >/dev/null; echo partial; exit 4");
        let plan = Plan::new("p", vec![PlanStep::new("s1").with_artifact("missing.txt")]);

        let result = executor
            .execute(&plan, &ExecutionOptions::primary(dir.path(), "s1"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("partial"));
        assert!(result.output.contains("exited with code 4"));
        assert!(result.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = CommandExecutor::new(ExecutorConfig {
            program: "no-such-executor-binary".to_string(),
            args: vec![],
            timeout_secs: 5,
        });
        let plan = Plan::new("p", vec![PlanStep::new("s1")]);
        let err = executor
            .execute(&plan, &ExecutionOptions::primary(dir.path(), "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ExecutionFailed(_)));
        assert!(!executor.is_available().await);
    }
}
