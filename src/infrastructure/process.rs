//! Subprocess execution with explicit timeouts.
//!
//! Every external command the core runs (VCS, verification, executor,
//! advisors) goes through [`run_command`]. The child is killed when the
//! timeout elapses; the result is always a [`CommandOutput`], never an error.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::ports::CommandOutput;

/// Description of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub stdin: Option<Vec<u8>>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            timeout,
            stdin: None,
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Run a command to completion or until its timeout elapses.
pub async fn run_command(spec: CommandSpec) -> CommandOutput {
    let started = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %spec.program, error = %e, "Failed to spawn command");
            return CommandOutput {
                spawn_error: Some(e.to_string()),
                duration_ms: elapsed_ms(started),
                ..Default::default()
            };
        }
    };

    let stdin_handle = child.stdin.take();
    let input = spec.stdin;
    let run = async move {
        let feed = async move {
            if let (Some(mut handle), Some(bytes)) = (stdin_handle, input) {
                // A child that exits without reading stdin yields EPIPE here.
                let _ = handle.write_all(&bytes).await;
                let _ = handle.shutdown().await;
            }
        };
        let (_, output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    match timeout(spec.timeout, run).await {
        Ok(Ok(output)) => {
            let result = CommandOutput {
                exit_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
                timed_out: false,
                spawn_error: None,
                duration_ms: elapsed_ms(started),
            };
            debug!(
                program = %spec.program,
                args = ?spec.args,
                exit_code = ?result.exit_code,
                duration_ms = result.duration_ms,
                "Command finished"
            );
            result
        }
        Ok(Err(e)) => CommandOutput {
            spawn_error: Some(format!("failed to wait for process: {e}")),
            duration_ms: elapsed_ms(started),
            ..Default::default()
        },
        Err(_) => {
            // Dropping the wait future kills the child (kill_on_drop).
            warn!(
                program = %spec.program,
                args = ?spec.args,
                timeout_ms = spec.timeout.as_millis() as u64,
                "Command timed out"
            );
            CommandOutput {
                timed_out: true,
                duration_ms: elapsed_ms(started),
                ..Default::default()
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
