pub mod analysis;
pub mod config;
pub mod event;
pub mod intervention;
pub mod message;
pub mod task;

pub use analysis::{AnalysisResult, AnalysisStatus};
pub use config::{AnalyzerConfig, Config, LoggingConfig, SupervisorConfig};
pub use event::{Event, EventData, EventType};
pub use intervention::{
    DetectedIssue, InterventionOutcome, InterventionRecord, InterventionType, IssueSeverity,
    IssueType,
};
pub use message::{Message, MessageRole, ToolCall};
pub use task::{ProgressSnapshot, Task, TaskStatus};
