//! Verification runner port.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::models::VerificationOutcome;

/// Runs a step's verification commands.
///
/// Failures, including timeouts and spawn errors, are reported in the
/// returned outcome rather than as errors.
#[async_trait]
pub trait VerificationRunner: Send + Sync {
    async fn run(&self, cwd: &Path, command: &str) -> VerificationOutcome;
}
