//! Advisor runner port.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::models::AdvisorConfig;

/// Raw result of invoking one external advisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvisorInvocation {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub timed_out: bool,
    /// Set when the advisor could not be started or did not finish cleanly.
    pub error: Option<String>,
}

/// Invokes an external advisor program against an input artifact.
#[async_trait]
pub trait AdvisorRunner: Send + Sync {
    async fn invoke(&self, advisor: &AdvisorConfig, input_path: &Path) -> AdvisorInvocation;
}
