use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Smallest snippet limit that still leaves room for a readable sentence.
const MIN_SNIPPET_CHARS: usize = 16;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting that must be positive was zero.
    #[error("Invalid {field}: must be at least 1")]
    ZeroValue { field: &'static str },

    #[error(
        "Invalid thresholds: stuck_threshold_seconds ({stuck}) must not be below waiting_threshold_seconds ({waiting})"
    )]
    /// The stuck threshold is below the waiting threshold.
    InvalidThresholds { stuck: u64, waiting: u64 },

    /// The snippet limit is too small to be useful.
    #[error("Invalid max_snippet_chars: {0}. Must be at least {MIN_SNIPPET_CHARS}")]
    InvalidSnippetLimit(usize),

    /// The analyzer would consider no message roles.
    #[error("Analyzer roles cannot be empty")]
    EmptyRoles,

    /// Unknown log level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown rotation policy.
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),
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
    /// 4. Environment variables (WARDEN_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
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

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".warden/config.yaml"))
            .merge(Yaml::file(".warden/local.yaml"))
            .merge(Env::prefixed("WARDEN_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let supervisor = &config.supervisor;

        let non_zero = [
            ("evaluation_interval_seconds", supervisor.evaluation_interval_seconds == 0),
            ("max_interventions_per_instance", supervisor.max_interventions_per_instance == 0),
            ("escalation_threshold", supervisor.escalation_threshold == 0),
            ("error_loop_threshold", supervisor.error_loop_threshold == 0),
            ("transcript_max_lines", supervisor.transcript_max_lines == 0),
            ("message_timeout_seconds", supervisor.message_timeout_seconds == 0),
            ("max_history", supervisor.max_history == 0),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::ZeroValue { field });
        }

        if supervisor.stuck_threshold_seconds < supervisor.waiting_threshold_seconds {
            return Err(ConfigError::InvalidThresholds {
                stuck: supervisor.stuck_threshold_seconds,
                waiting: supervisor.waiting_threshold_seconds,
            });
        }

        // Validate analyzer config
        if config.analyzer.max_snippet_chars < MIN_SNIPPET_CHARS {
            return Err(ConfigError::InvalidSnippetLimit(
                config.analyzer.max_snippet_chars,
            ));
        }
        if config.analyzer.roles.is_empty() {
            return Err(ConfigError::EmptyRoles);
        }

        // Validate logging config
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
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MessageRole;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.supervisor.stuck_threshold_seconds, 300);
        assert_eq!(config.supervisor.max_interventions_per_instance, 5);
        assert_eq!(config.analyzer.max_snippet_chars, 150);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
supervisor:
  evaluation_interval_seconds: 10
  intervention_cooldown_seconds: 0
  max_interventions_per_instance: 2
analyzer:
  max_snippet_chars: 80
  roles: [assistant, tool]
logging:
  level: debug
  format: pretty
  retention_days: 7
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.supervisor.evaluation_interval_seconds, 10);
        assert_eq!(config.supervisor.intervention_cooldown_seconds, 0);
        assert_eq!(config.supervisor.max_interventions_per_instance, 2);
        assert_eq!(config.supervisor.stuck_threshold_seconds, 300);
        assert_eq!(config.analyzer.max_snippet_chars, 80);
        assert_eq!(
            config.analyzer.roles,
            vec![MessageRole::Assistant, MessageRole::Tool]
        );
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.retention_days, 7);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.supervisor.max_interventions_per_instance = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroValue {
                field: "max_interventions_per_instance"
            })
        ));

        let mut config = Config::default();
        config.supervisor.evaluation_interval_seconds = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroValue {
                field: "evaluation_interval_seconds"
            })
        ));

        let mut config = Config::default();
        config.supervisor.max_history = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroValue { field: "max_history" })
        ));
    }

    #[test]
    fn test_zero_cooldown_is_valid() {
        let mut config = Config::default();
        config.supervisor.intervention_cooldown_seconds = 0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = Config::default();
        config.supervisor.stuck_threshold_seconds = 60;
        config.supervisor.waiting_threshold_seconds = 120;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidThresholds {
                stuck: 60,
                waiting: 120
            })
        ));
    }

    #[test]
    fn test_validate_analyzer() {
        let mut config = Config::default();
        config.analyzer.max_snippet_chars = 8;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSnippetLimit(8))
        ));

        let mut config = Config::default();
        config.analyzer.roles.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyRoles)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format_and_rotation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRotation(_))
        ));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("WARDEN_SUPERVISOR__MAX_INTERVENTIONS_PER_INSTANCE", Some("9")),
                ("WARDEN_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config: Config = ConfigLoader::figment().extract().unwrap();
                assert_eq!(config.supervisor.max_interventions_per_instance, 9);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "supervisor:\n  escalation_threshold: 2\nlogging:\n  rotation: hourly"
        )
        .unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();

        assert_eq!(config.supervisor.escalation_threshold, 2);
        assert_eq!(config.logging.rotation, "hourly");
        assert_eq!(config.supervisor.max_history, 1000);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "supervisor:\n  max_history: 0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "supervisor:\n  max_interventions_per_instance: 3\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(
            override_file,
            "supervisor:\n  max_interventions_per_instance: 7\nlogging:\n  level: debug"
        )
        .unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.supervisor.max_interventions_per_instance, 7, "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
