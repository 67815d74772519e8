//! Instance manager port - interface to the process layer running the agents.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Lifecycle state reported for a monitored instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Launching; not yet accepting work.
    Starting,
    /// Working normally.
    Running,
    /// Running and occupied with a request.
    Busy,
    /// Running with nothing to do.
    Idle,
    /// Exited.
    Stopped,
    /// Crashed or unreachable.
    Error,
}

impl InstanceState {
    /// Whether the supervisor should evaluate instances in this state.
    pub fn is_supervisable(&self) -> bool {
        matches!(self, Self::Running | Self::Busy | Self::Idle)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Busy => "busy",
            Self::Idle => "idle",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// Identity and state of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// Instance id.
    pub id: String,
    /// Reported state.
    pub state: InstanceState,
}

impl InstanceSummary {
    /// Create a summary.
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

/// Options for delivering a message to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Block until the instance produces a response.
    pub wait_for_response: bool,
    /// Deadline for the call; enforced by the implementation.
    pub timeout: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            wait_for_response: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Acknowledgement returned after a message was delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    /// Whether the instance actually received the message.
    pub delivered: bool,
    /// Response text when `wait_for_response` was requested.
    pub response: Option<String>,
}

/// Trait for the process layer that launches and talks to instances.
///
/// Every call may fail; the supervisor tolerates failures per instance and
/// never retries within a cycle.
#[async_trait]
pub trait InstanceManager: Send + Sync {
    /// List every known instance with its state.
    async fn list_instances(&self) -> DomainResult<Vec<InstanceSummary>>;

    /// Fetch up to `max_lines` of the instance's most recent transcript.
    async fn fetch_transcript(&self, instance_id: &str, max_lines: usize) -> DomainResult<String>;

    /// Send text to the instance.
    async fn send_message(
        &self,
        instance_id: &str,
        text: &str,
        options: SendOptions,
    ) -> DomainResult<MessageAck>;

    /// Ids of instances in a supervisable state (running, busy or idle).
    async fn list_active_instance_ids(&self) -> DomainResult<Vec<String>> {
        Ok(self
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| instance.state.is_supervisable())
            .map(|instance| instance.id)
            .collect())
    }
}
