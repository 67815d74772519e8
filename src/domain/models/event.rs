//! Supervision events.
//!
//! Events are immutable, fire-and-forget notifications. They are delivered
//! in-process by the event bus and never persisted or replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A task was added to the tracker.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A task moved to completed.
    #[serde(rename = "task.completed")]
    TaskCompleted,
    /// A task moved to failed.
    #[serde(rename = "task.failed")]
    TaskFailed,
    /// A milestone was recorded.
    #[serde(rename = "milestone.reached")]
    MilestoneReached,
    /// A task became blocked.
    #[serde(rename = "blocker.detected")]
    BlockerDetected,
    /// An instance ran a tool.
    #[serde(rename = "tool.executed")]
    ToolExecuted,
    /// The coordinator finished tracking an analysis batch.
    #[serde(rename = "analysis.completed")]
    AnalysisCompleted,
}

impl EventType {
    /// Every event type, in taxonomy order.
    pub const ALL: [Self; 7] = [
        Self::TaskStarted,
        Self::TaskCompleted,
        Self::TaskFailed,
        Self::MilestoneReached,
        Self::BlockerDetected,
        Self::ToolExecuted,
        Self::AnalysisCompleted,
    ];

    /// Dotted wire name, e.g. `task.started`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "task.started",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::MilestoneReached => "milestone.reached",
            Self::BlockerDetected => "blocker.detected",
            Self::ToolExecuted => "tool.executed",
            Self::AnalysisCompleted => "analysis.completed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload map.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// An immutable event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Kind of event.
    pub event_type: EventType,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that emitted the event.
    pub source: String,
    /// Event-specific payload.
    pub data: EventData,
    /// Groups events produced by one coordinator call.
    pub correlation_id: Option<Uuid>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: EventType, source: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            source: source.into(),
            data,
            correlation_id: None,
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}
