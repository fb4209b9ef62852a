//! Mock executor for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExecutionOptions, ExecutionResult, Plan};
use crate::domain::ports::ExecutorAdapter;

/// Mock response configuration.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Output text
    pub output: String,
    /// Whether the step reports success
    pub success: bool,
    /// Return `Err(ExecutionFailed)` with this message instead of a result
    pub error: Option<String>,
    /// Files written relative to the workspace (skipped on dry runs)
    pub writes: Vec<(String, String)>,
    /// Files removed relative to the workspace (skipped on dry runs)
    pub removes: Vec<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            output: "Mock step completed successfully.".to_string(),
            success: true,
            error: None,
            writes: Vec::new(),
            removes: Vec::new(),
        }
    }
}

impl MockResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn writing(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.writes.push((path.into(), content.into()));
        self
    }

    pub fn removing(mut self, path: impl Into<String>) -> Self {
        self.removes.push(path.into());
        self
    }
}

/// Executor that replays canned responses and records every call.
pub struct MockExecutor {
    default_response: MockResponse,
    step_responses: Arc<RwLock<HashMap<String, MockResponse>>>,
    role_responses: Arc<RwLock<HashMap<String, MockResponse>>>,
    calls: Arc<RwLock<Vec<ExecutionOptions>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::with_default_response(MockResponse::default())
    }

    pub fn with_default_response(response: MockResponse) -> Self {
        Self {
            default_response: response,
            step_responses: Arc::new(RwLock::new(HashMap::new())),
            role_responses: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set a specific response for a step of the primary run.
    pub async fn set_response_for_step(&self, step_id: impl Into<String>, response: MockResponse) {
        self.step_responses
            .write()
            .await
            .insert(step_id.into(), response);
    }

    /// Set a specific response for every replay of a role.
    pub async fn set_response_for_role(&self, role: impl Into<String>, response: MockResponse) {
        self.role_responses.write().await.insert(role.into(), response);
    }

    /// Every invocation so far, in call order.
    pub async fn calls(&self) -> Vec<ExecutionOptions> {
        self.calls.read().await.clone()
    }

    async fn response_for(&self, options: &ExecutionOptions) -> MockResponse {
        if let Some(role) = &options.role {
            if let Some(response) = self.role_responses.read().await.get(role) {
                return response.clone();
            }
        }
        self.step_responses
            .read()
            .await
            .get(&options.step_id)
            .cloned()
            .unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorAdapter for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        _plan: &Plan,
        options: &ExecutionOptions,
    ) -> DomainResult<ExecutionResult> {
        self.calls.write().await.push(options.clone());
        let response = self.response_for(options).await;

        if let Some(message) = response.error {
            return Err(DomainError::ExecutionFailed(message));
        }

        let mut artifacts = Vec::new();
        if !options.dry_run {
            for (path, content) in &response.writes {
                let target = options.cwd.join(path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DomainError::io(parent, e))?;
                }
                tokio::fs::write(&target, content)
                    .await
                    .map_err(|e| DomainError::io(&target, e))?;
                artifacts.push(path.clone());
            }
            for path in &response.removes {
                let target = options.cwd.join(path);
                if target.exists() {
                    tokio::fs::remove_file(&target)
                        .await
                        .map_err(|e| DomainError::io(&target, e))?;
                }
            }
        }

        Ok(ExecutionResult {
            success: response.success,
            output: response.output,
            artifacts,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}
