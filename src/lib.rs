//! Warden - Autonomous Supervision Engine
//!
//! Warden watches a fleet of AI coding-agent instances, infers each one's
//! state from raw transcript text, tracks task and milestone progress, and
//! intervenes with templated instructions when an instance looks stuck,
//! idle or caught in an error loop. Interventions are rate limited per
//! instance; once automated remediation is exhausted the issue is escalated
//! to a human.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the `InstanceManager` port
//! - **Service Layer** (`services`): transcript analysis, progress tracking,
//!   the event bus and the supervisor control loop
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **Adapters** (`adapters`): an in-memory `InstanceManager`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden::{ConfigLoader, EventBus, ProgressTracker, SupervisorAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let tracker = Arc::new(ProgressTracker::new(Arc::new(EventBus::new())));
//!     let agent = SupervisorAgent::new(my_instance_manager(), tracker, config.supervisor);
//!     agent.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     agent.stop().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::instances::ScriptedInstanceManager;
pub use domain::models::{
    AnalysisResult, AnalysisStatus, AnalyzerConfig, Config, DetectedIssue, Event, EventData,
    EventType, InterventionOutcome, InterventionRecord, InterventionType, IssueSeverity,
    IssueType, LoggingConfig, Message, MessageRole, ProgressSnapshot, SupervisorConfig, Task,
    TaskStatus, ToolCall,
};
pub use domain::ports::{InstanceManager, InstanceState, InstanceSummary, MessageAck, SendOptions};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::{LogConfig, LoggerImpl};
pub use services::{
    CoordinationResult, CycleReport, EscalationReason, EventBus, NetworkHealthSummary,
    PolicyOutcome, ProgressTracker, SupervisionCoordinator, SupervisorAgent, TranscriptAnalyzer,
};
