//! Shell-based verification runner.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::models::{ExecutionConfig, VerificationOutcome};
use crate::domain::ports::VerificationRunner;
use crate::infrastructure::process::{run_command, CommandSpec};

/// Runs each verification command through `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellVerificationRunner {
    shell: String,
    timeout: Duration,
}

impl ShellVerificationRunner {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(
            config.shell.clone(),
            Duration::from_secs(config.verification_timeout_secs),
        )
    }
}

impl Default for ShellVerificationRunner {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

#[async_trait]
impl VerificationRunner for ShellVerificationRunner {
    async fn run(&self, cwd: &Path, command: &str) -> VerificationOutcome {
        let output = run_command(
            CommandSpec::new(&self.shell, cwd, self.timeout).args(["-c", command]),
        )
        .await;

        let mut text = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if !output.success() && text.trim().is_empty() {
            text = output.failure_message();
        }

        debug!(command, success = output.success(), "Verification command finished");

        VerificationOutcome {
            command: command.to_string(),
            success: output.success(),
            exit_code: output.exit_code,
            output: text,
            timed_out: output.timed_out,
            duration_ms: output.duration_ms,
        }
    }
}
