use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::message::MessageRole;

/// Main configuration structure for Warden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Supervisor control loop and intervention policy
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Transcript analyzer tuning
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Supervisor configuration. Fixed once the supervisor is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Seconds of unchanged transcript before an instance is considered stuck
    #[serde(default = "default_stuck_threshold_seconds")]
    pub stuck_threshold_seconds: u64,

    /// Seconds of unchanged transcript after completion before an instance is considered waiting
    #[serde(default = "default_waiting_threshold_seconds")]
    pub waiting_threshold_seconds: u64,

    /// Failed task count that signals an error loop
    #[serde(default = "default_error_loop_threshold")]
    pub error_loop_threshold: usize,

    /// Interventions allowed per instance before escalating
    #[serde(default = "default_max_interventions_per_instance")]
    pub max_interventions_per_instance: u32,

    /// Minimum seconds between interventions on the same instance
    #[serde(default = "default_intervention_cooldown_seconds")]
    pub intervention_cooldown_seconds: u64,

    /// Seconds between evaluation cycles
    #[serde(default = "default_evaluation_interval_seconds")]
    pub evaluation_interval_seconds: u64,

    /// Consecutive failed interventions before escalating
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,

    /// Transcript lines fetched per instance per cycle
    #[serde(default = "default_transcript_max_lines")]
    pub transcript_max_lines: usize,

    /// Timeout passed to the instance manager when sending interventions
    #[serde(default = "default_message_timeout_seconds")]
    pub message_timeout_seconds: u64,

    /// Intervention records retained in history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

const fn default_stuck_threshold_seconds() -> u64 {
    300
}

const fn default_waiting_threshold_seconds() -> u64 {
    120
}

const fn default_error_loop_threshold() -> usize {
    3
}

const fn default_max_interventions_per_instance() -> u32 {
    5
}

const fn default_intervention_cooldown_seconds() -> u64 {
    60
}

const fn default_evaluation_interval_seconds() -> u64 {
    30
}

const fn default_escalation_threshold() -> u32 {
    3
}

const fn default_transcript_max_lines() -> usize {
    100
}

const fn default_message_timeout_seconds() -> u64 {
    30
}

const fn default_max_history() -> usize {
    1000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_seconds: default_stuck_threshold_seconds(),
            waiting_threshold_seconds: default_waiting_threshold_seconds(),
            error_loop_threshold: default_error_loop_threshold(),
            max_interventions_per_instance: default_max_interventions_per_instance(),
            intervention_cooldown_seconds: default_intervention_cooldown_seconds(),
            evaluation_interval_seconds: default_evaluation_interval_seconds(),
            escalation_threshold: default_escalation_threshold(),
            transcript_max_lines: default_transcript_max_lines(),
            message_timeout_seconds: default_message_timeout_seconds(),
            max_history: default_max_history(),
        }
    }
}

impl SupervisorConfig {
    /// Sleep between evaluation cycles.
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_seconds)
    }

    /// Minimum spacing between interventions on one instance.
    pub fn intervention_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.intervention_cooldown_seconds).unwrap_or(i64::MAX))
    }

    /// Deadline passed to the instance manager for sends.
    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_seconds)
    }
}

/// Transcript analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalyzerConfig {
    /// Maximum characters kept per extracted snippet
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,

    /// Message roles whose content is analysed
    #[serde(default = "default_roles")]
    pub roles: Vec<MessageRole>,
}

const fn default_max_snippet_chars() -> usize {
    150
}

fn default_roles() -> Vec<MessageRole> {
    vec![MessageRole::Assistant]
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_snippet_chars: default_max_snippet_chars(),
            roles: default_roles(),
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

    /// Also log to stdout when writing files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_true(),
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}
