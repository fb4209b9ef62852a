//! Service layer: the algorithms of the execution-safety core.
//!
//! Services depend only on domain models and ports; concrete subprocess and
//! file adapters are injected as `Arc<dyn Port>`.

pub mod consistency_guardian;
pub mod convergence_protocol;
pub mod digest;
pub mod drift_detector;
pub mod execution_harness;
pub mod multi_agent_harness;
pub mod progress_tracker;
pub mod retry_policy;
pub mod rollback_engine;
pub mod session_journal;
pub mod snapshot_manager;
pub mod worktree_service;

pub use consistency_guardian::{score_violations, ConsistencyGuardian};
pub use convergence_protocol::{
    local_opinion, parse_advisor_output, resolve_convergence, ConvergenceProtocol,
    ConvergenceSubject, QUORUM_THRESHOLD,
};
pub use drift_detector::{classify_changes, normalize_rule, rule_matches, DriftDetector};
pub use execution_harness::{new_run_id, ExecutionHarness, HarnessOptions};
pub use multi_agent_harness::{detect_role_conflicts, normalize_output, MultiAgentHarness};
pub use progress_tracker::ProgressTracker;
pub use retry_policy::{RetryError, RetryPolicy};
pub use rollback_engine::{RollbackEngine, RollbackOptions};
pub use session_journal::SessionJournal;
pub use snapshot_manager::{is_state_path, SnapshotManager};
pub use worktree_service::WorktreeService;
