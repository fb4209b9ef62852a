//! Git implementation of the version control gateway.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::models::VcsConfig;
use crate::domain::ports::{CommandOutput, VersionControlGateway};
use crate::infrastructure::process::{run_command, CommandSpec};

/// Runs `git` as a subprocess with a per-command timeout.
#[derive(Debug, Clone)]
pub struct GitGateway {
    program: String,
    timeout: Duration,
}

impl GitGateway {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &VcsConfig) -> Self {
        Self::new(config.program.clone(), config.timeout())
    }
}

impl Default for GitGateway {
    fn default() -> Self {
        Self::from_config(&VcsConfig::default())
    }
}

#[async_trait]
impl VersionControlGateway for GitGateway {
    async fn run(&self, cwd: &Path, args: &[String]) -> CommandOutput {
        let spec = CommandSpec::new(&self.program, cwd, self.timeout)
            .args(args.iter().cloned())
            // Never block on a credential or editor prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true");
        run_command(spec).await
    }
}
