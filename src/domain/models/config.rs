use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for Warden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Runtime-state directory, relative to the repository root.
    /// Never captured in snapshots and never removed by a restore.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Version control subprocess configuration
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Snapshot retention
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Consistency guardian configuration
    #[serde(default)]
    pub guardian: GuardianConfig,

    /// Rollback retry policy
    #[serde(default)]
    pub rollback: RetryConfig,

    /// Step execution and verification
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Optional subprocess executor
    #[serde(default)]
    pub executor: Option<ExecutorConfig>,

    /// Advisor quorum configuration
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// Role replay configuration
    #[serde(default)]
    pub multi_agent: MultiAgentConfig,
}

fn default_state_dir() -> String {
    ".warden".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            logging: LoggingConfig::default(),
            vcs: VcsConfig::default(),
            snapshots: SnapshotConfig::default(),
            guardian: GuardianConfig::default(),
            rollback: RetryConfig::default(),
            execution: ExecutionConfig::default(),
            executor: None,
            convergence: ConvergenceConfig::default(),
            multi_agent: MultiAgentConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Version control subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VcsConfig {
    #[serde(default = "default_vcs_program")]
    pub program: String,

    #[serde(default = "default_vcs_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_vcs_program() -> String {
    "git".to_string()
}

const fn default_vcs_timeout_secs() -> u64 {
    60
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            program: default_vcs_program(),
            timeout_secs: default_vcs_timeout_secs(),
        }
    }
}

impl VcsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Snapshot retention
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Keep only this many newest snapshots after each create
    #[serde(default)]
    pub retain: Option<usize>,
}

/// Consistency guardian configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GuardianConfig {
    /// Take a snapshot automatically when a high-severity violation is found
    #[serde(default = "default_true")]
    pub auto_snapshot_on_high_risk: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            auto_snapshot_on_high_risk: true,
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Step execution and verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Shell used to run verification commands
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_verification_timeout_secs")]
    pub verification_timeout_secs: u64,
}

fn default_shell() -> String {
    "sh".to_string()
}

const fn default_verification_timeout_secs() -> u64 {
    600
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            verification_timeout_secs: default_verification_timeout_secs(),
        }
    }
}

/// Subprocess executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_executor_timeout_secs() -> u64 {
    1_800
}

/// One external advisor script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdvisorConfig {
    pub name: String,

    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_advisor_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a failed or unparseable invocation
    #[serde(default)]
    pub retries: u32,
}

const fn default_advisor_timeout_secs() -> u64 {
    120
}

impl AdvisorConfig {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout_secs: default_advisor_timeout_secs(),
            retries: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Advisor quorum configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvergenceConfig {
    /// Require at least one external, parsed, evidence-backed vote
    #[serde(default)]
    pub strict_external: bool,

    #[serde(default)]
    pub advisors: Vec<AdvisorConfig>,
}

/// Role replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MultiAgentConfig {
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,

    /// Concurrent role runs per batch, clamped to 1..=8
    #[serde(default = "default_fanout")]
    pub fanout: usize,
}

fn default_roles() -> Vec<String> {
    vec!["reviewer".to_string(), "tester".to_string()]
}

const fn default_fanout() -> usize {
    2
}

pub const MIN_FANOUT: usize = 1;
pub const MAX_FANOUT: usize = 8;

impl Default for MultiAgentConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            fanout: default_fanout(),
        }
    }
}

impl MultiAgentConfig {
    pub fn effective_fanout(&self) -> usize {
        self.fanout.clamp(MIN_FANOUT, MAX_FANOUT)
    }
}
