pub mod config;
pub mod consistency;
pub mod convergence;
pub mod execution;
pub mod fingerprint;
pub mod plan;
pub mod session;
pub mod snapshot;
pub mod worktree;

pub use config::{
    AdvisorConfig, Config, ConvergenceConfig, ExecutionConfig, ExecutorConfig, GuardianConfig,
    LoggingConfig, MultiAgentConfig, RetryConfig, SnapshotConfig, VcsConfig,
};
pub use consistency::{
    ConsistencyReport, ConsistencyViolation, DriftReport, DriftSeverity, GateStage,
    GuardContract, Severity,
};
pub use convergence::{
    AdvisorOpinion, ConvergenceDecision, ConvergenceStage, ParseStatus, ParsedOpinion, Vote,
    VoteTally, LOCAL_ADVISOR,
};
pub use execution::{
    ExecutionOptions, ExecutionResult, HaltReason, HarnessReport, StepOutput,
    VerificationOutcome,
};
pub use fingerprint::{ArtifactObservation, FingerprintEntry, MAX_FINGERPRINT_HISTORY};
pub use plan::{Plan, PlanStep, RiskLevel, StepProgress, StepStatus};
pub use session::{
    ExecutionMode, ExecutionSessionRecord, MultiAgentSummary, RoleConflict, RoleConflictKind,
    RoleRunResult, RollbackRecord,
};
pub use snapshot::{
    SnapshotChecksums, SnapshotComponent, SnapshotRecord, UntrackedEntry, UntrackedManifest,
};
pub use worktree::WorktreeSession;
