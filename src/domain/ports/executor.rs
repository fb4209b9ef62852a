//! Executor adapter port.
//!
//! The executor is the black box that actually changes the repository for a
//! plan step. The harness only relies on this contract, so any executor that
//! satisfies it can be substituted.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ExecutionOptions, ExecutionResult, Plan};

#[async_trait]
pub trait ExecutorAdapter: Send + Sync {
    /// Short identifier used in logs and records.
    fn name(&self) -> &str;

    /// Execute `plan` (a single-step sub-plan when driven by the harness).
    async fn execute(&self, plan: &Plan, options: &ExecutionOptions)
        -> DomainResult<ExecutionResult>;

    /// Whether the executor can run at all in this environment.
    async fn is_available(&self) -> bool;
}
