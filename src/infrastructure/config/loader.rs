use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("State directory cannot be empty")]
    EmptyStateDir,

    #[error("Invalid timeout for {0}: must be at least 1 second")]
    ZeroTimeout(String),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("multi_agent.roles cannot be empty")]
    EmptyRoles,

    #[error("Invalid role name: {0:?}")]
    InvalidRole(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .warden/config.yaml (project config)
    /// 3. .warden/local.yaml (project local overrides, optional)
    /// 4. Environment variables (WARDEN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`] but rooted at `root` instead of the
    /// current directory.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let config: Config = Self::figment(root)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(root: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join(".warden/config.yaml")))
            .merge(Yaml::file(root.join(".warden/local.yaml")))
            .merge(Env::prefixed("WARDEN_").split("__"))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.state_dir.trim().is_empty() {
            return Err(ConfigError::EmptyStateDir);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        if config.vcs.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("vcs".to_string()));
        }
        if config.execution.verification_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("execution.verification".to_string()));
        }
        if let Some(executor) = &config.executor {
            if executor.program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "executor program cannot be empty".to_string(),
                ));
            }
            if executor.timeout_secs == 0 {
                return Err(ConfigError::ZeroTimeout("executor".to_string()));
            }
        }

        if config.rollback.initial_backoff_ms > config.rollback.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.rollback.initial_backoff_ms,
                config.rollback.max_backoff_ms,
            ));
        }

        if config.multi_agent.roles.is_empty() {
            return Err(ConfigError::EmptyRoles);
        }
        let mut roles = HashSet::new();
        for role in &config.multi_agent.roles {
            if role.trim().is_empty() || !roles.insert(role.as_str()) {
                return Err(ConfigError::InvalidRole(role.clone()));
            }
        }

        let mut advisors = HashSet::new();
        for advisor in &config.convergence.advisors {
            if advisor.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "advisor name cannot be empty".to_string(),
                ));
            }
            if advisor.program.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "advisor '{}' program cannot be empty",
                    advisor.name
                )));
            }
            if advisor.timeout_secs == 0 {
                return Err(ConfigError::ZeroTimeout(format!("advisor '{}'", advisor.name)));
            }
            if !advisors.insert(advisor.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate advisor name '{}'",
                    advisor.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{AdvisorConfig, ExecutorConfig};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.state_dir, ".warden");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.rollback.max_retries, 2);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
state_dir: .guard
logging:
  level: debug
  format: pretty
rollback:
  max_retries: 4
  initial_backoff_ms: 10
  max_backoff_ms: 100
convergence:
  strict_external: true
  advisors:
    - name: reviewer
      program: ./advise.sh
      retries: 1
multi_agent:
  roles: [reviewer, tester, auditor]
  fanout: 3
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.state_dir, ".guard");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.rollback.max_retries, 4);
        assert!(config.convergence.strict_external);
        assert_eq!(config.convergence.advisors[0].timeout_secs, 120);
        assert_eq!(config.convergence.advisors[0].retries, 1);
        assert_eq!(config.multi_agent.roles.len(), 3);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_empty_state_dir() {
        let config = Config {
            state_dir: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyStateDir)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogFormat(format)) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = Config::default();
        config.vcs.timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroTimeout(_))
        ));

        let mut config = Config::default();
        config.executor = Some(ExecutorConfig {
            program: "run-step".to_string(),
            args: vec![],
            timeout_secs: 0,
        });
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroTimeout(_))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.rollback.initial_backoff_ms = 30000;
        config.rollback.max_backoff_ms = 10000;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30000, 10000))
        ));
    }

    #[test]
    fn test_validate_equal_backoff_is_allowed() {
        let mut config = Config::default();
        config.rollback.initial_backoff_ms = 500;
        config.rollback.max_backoff_ms = 500;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_roles() {
        let mut config = Config::default();
        config.multi_agent.roles.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyRoles)
        ));

        config.multi_agent.roles = vec!["tester".to_string(), "tester".to_string()];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRole(role)) if role == "tester"
        ));
    }

    #[test]
    fn test_fanout_out_of_range_is_not_rejected() {
        let mut config = Config::default();
        config.multi_agent.fanout = 100;
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.multi_agent.effective_fanout(), 8);
    }

    #[test]
    fn test_validate_duplicate_advisors() {
        let mut config = Config::default();
        config.convergence.advisors = vec![
            AdvisorConfig::new("codex", "./a.sh"),
            AdvisorConfig::new("codex", "./b.sh"),
        ];
        match ConfigLoader::validate(&config) {
            Err(ConfigError::ValidationFailed(msg)) => assert!(msg.contains("duplicate")),
            other => panic!("Expected ValidationFailed error, got {other:?}"),
        }

        config.convergence.advisors = vec![AdvisorConfig::new("codex", "")];
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("WARDEN_LOGGING__LEVEL", Some("debug")),
                ("WARDEN_MULTI_AGENT__FANOUT", Some("4")),
                ("WARDEN_VCS__TIMEOUT_SECS", Some("15")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.multi_agent.fanout, 4);
                assert_eq!(config.vcs.timeout_secs, 15);
            },
        );
    }

    #[test]
    fn test_env_override_wins_over_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".warden")).unwrap();
        std::fs::write(
            dir.path().join(".warden/config.yaml"),
            "logging:\n  level: warn\nvcs:\n  timeout_secs: 30\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(".warden/local.yaml"), "vcs:\n  timeout_secs: 45\n")
            .unwrap();

        temp_env::with_var("WARDEN_LOGGING__LEVEL", Some("error"), || {
            let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.logging.level, "error");
            assert_eq!(config.vcs.timeout_secs, 45);
        });
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".warden")).unwrap();
        std::fs::write(
            dir.path().join(".warden/config.yaml"),
            "logging:\n  format: xml\n",
        )
        .unwrap();

        temp_env::with_var_unset("WARDEN_LOGGING__FORMAT", || {
            assert!(ConfigLoader::load_from_dir(dir.path()).is_err());
        });
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        // Create base config
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "state_dir: .base\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        // Create override config
        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "state_dir: .override\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.state_dir, ".override", "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "executor:\n  program: ./run-step.sh\n  args: [--fast]").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        let executor = config.executor.unwrap();
        assert_eq!(executor.program, "./run-step.sh");
        assert_eq!(executor.args, vec!["--fast".to_string()]);
        assert_eq!(executor.timeout_secs, 1_800);
    }
}
