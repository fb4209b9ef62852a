//! Warden - execution-safety core for guarded repository changes
//!
//! Warden wraps an external change-making agent with checksum-verified
//! snapshots, verified rollback, drift and fingerprint consistency gates,
//! advisor quorum voting and isolated multi-role replays.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, ports and the domain error type
//! - **Service Layer** (`services`): snapshotting, rollback, guardian,
//!   convergence and the execution harnesses
//! - **Adapters** (`adapters`): subprocess and file implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging and
//!   process execution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden::adapters::{GitGateway, ShellVerificationRunner};
//! use warden::services::{RollbackEngine, RollbackOptions, SnapshotManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let vcs = Arc::new(GitGateway::default());
//! let snapshots = Arc::new(SnapshotManager::new(vcs, ".", ".warden"));
//! let snapshot = snapshots.create_snapshot("before refactor").await?;
//!
//! let engine = RollbackEngine::new(snapshots, Arc::new(ShellVerificationRunner::default()));
//! let options = RollbackOptions::new(".").with_verification("cargo check");
//! engine.rollback(&snapshot.id, &options).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, ConsistencyReport, ConvergenceDecision, ExecutionSessionRecord, GuardContract,
    HarnessReport, Plan, PlanStep, RiskLevel, SnapshotRecord,
};
pub use domain::ports::{
    AdvisorRunner, ExecutorAdapter, FingerprintStore, VerificationRunner, VersionControlGateway,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::{LogConfig, LoggerImpl};
pub use services::{
    ConsistencyGuardian, ConvergenceProtocol, ExecutionHarness, MultiAgentHarness,
    RollbackEngine, SessionJournal, SnapshotManager, WorktreeService,
};
