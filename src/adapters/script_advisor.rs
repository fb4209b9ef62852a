//! External advisor invoked as a script.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::models::AdvisorConfig;
use crate::domain::ports::{AdvisorInvocation, AdvisorRunner};
use crate::infrastructure::process::{run_command, CommandSpec};

/// Runs `<program> <args..> <input_path>` from a fixed working directory.
#[derive(Debug, Clone)]
pub struct ScriptAdvisorRunner {
    workdir: PathBuf,
}

impl ScriptAdvisorRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl AdvisorRunner for ScriptAdvisorRunner {
    async fn invoke(&self, advisor: &AdvisorConfig, input_path: &Path) -> AdvisorInvocation {
        let spec = CommandSpec::new(&advisor.program, &self.workdir, advisor.timeout())
            .args(advisor.args.iter().cloned())
            .args([input_path.to_string_lossy().into_owned()]);
        let output = run_command(spec).await;

        let error = if output.success() {
            None
        } else {
            Some(output.failure_message())
        };
        if let Some(ref message) = error {
            warn!(advisor = %advisor.name, error = %message, "Advisor invocation failed");
        } else {
            debug!(advisor = %advisor.name, duration_ms = output.duration_ms, "Advisor responded");
        }

        AdvisorInvocation {
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
            success: output.success(),
            timed_out: output.timed_out,
            error,
        }
    }
}
