//! In-memory instance manager.
//!
//! [`ScriptedInstanceManager`] holds instance state and transcript text in
//! memory and can be told to fail individual calls. It is the adapter used
//! when embedding the supervisor without a process layer, and by the tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{InstanceManager, InstanceState, InstanceSummary, MessageAck, SendOptions};

/// A message delivered through [`ScriptedInstanceManager::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Recipient instance.
    pub instance_id: String,
    /// Message body as sent.
    pub text: String,
    /// Options the caller passed.
    pub options: SendOptions,
    /// When the send was accepted.
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ScriptedInstance {
    state: InstanceState,
    transcript: String,
    fetch_failure: Option<String>,
    send_failure: Option<String>,
}

#[derive(Debug, Default)]
struct ScriptState {
    instances: BTreeMap<String, ScriptedInstance>,
    listing_failure: Option<String>,
    list_calls: u64,
    sent: Vec<SentMessage>,
}

/// In-memory [`InstanceManager`] with scriptable transcripts and failures.
#[derive(Debug, Default)]
pub struct ScriptedInstanceManager {
    state: RwLock<ScriptState>,
}

impl ScriptedInstanceManager {
    /// Create an empty manager with no instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance, replacing any previous one with the same id.
    pub async fn add_instance(&self, instance_id: impl Into<String>, state: InstanceState) {
        self.state.write().await.instances.insert(
            instance_id.into(),
            ScriptedInstance {
                state,
                transcript: String::new(),
                fetch_failure: None,
                send_failure: None,
            },
        );
    }

    /// Change the reported state of an existing instance.
    pub async fn set_state(&self, instance_id: &str, state: InstanceState) -> DomainResult<()> {
        self.with_instance(instance_id, |instance| instance.state = state)
            .await
    }

    /// Replace the instance's transcript.
    pub async fn set_transcript(&self, instance_id: &str, text: impl Into<String>) -> DomainResult<()> {
        let text = text.into();
        self.with_instance(instance_id, |instance| instance.transcript = text)
            .await
    }

    /// Append one transcript line.
    pub async fn append_line(&self, instance_id: &str, line: &str) -> DomainResult<()> {
        self.with_instance(instance_id, |instance| {
            if !instance.transcript.is_empty() {
                instance.transcript.push('\n');
            }
            instance.transcript.push_str(line);
        })
        .await
    }

    /// Make transcript fetches for `instance_id` fail until cleared.
    pub async fn fail_fetch(&self, instance_id: &str, reason: impl Into<String>) -> DomainResult<()> {
        let reason = reason.into();
        self.with_instance(instance_id, |instance| instance.fetch_failure = Some(reason))
            .await
    }

    /// Make message sends to `instance_id` fail until cleared.
    pub async fn fail_send(&self, instance_id: &str, reason: impl Into<String>) -> DomainResult<()> {
        let reason = reason.into();
        self.with_instance(instance_id, |instance| instance.send_failure = Some(reason))
            .await
    }

    /// Clear any scripted fetch or send failure.
    pub async fn clear_failures(&self, instance_id: &str) -> DomainResult<()> {
        self.with_instance(instance_id, |instance| {
            instance.fetch_failure = None;
            instance.send_failure = None;
        })
        .await
    }

    /// Make `list_instances` fail (or succeed again with `None`).
    pub async fn fail_listing(&self, reason: Option<String>) {
        self.state.write().await.listing_failure = reason;
    }

    /// Every message sent so far, in send order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.read().await.sent.clone()
    }

    /// Messages sent to one instance, in send order.
    pub async fn sent_to(&self, instance_id: &str) -> Vec<SentMessage> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|m| m.instance_id == instance_id)
            .cloned()
            .collect()
    }

    /// How many times the instance list was requested.
    pub async fn list_calls(&self) -> u64 {
        self.state.read().await.list_calls
    }

    async fn with_instance<F>(&self, instance_id: &str, f: F) -> DomainResult<()>
    where
        F: FnOnce(&mut ScriptedInstance),
    {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| unknown(instance_id))?;
        f(instance);
        Ok(())
    }
}

fn unknown(instance_id: &str) -> DomainError {
    DomainError::collaborator(instance_id, "unknown instance")
}

#[async_trait]
impl InstanceManager for ScriptedInstanceManager {
    async fn list_instances(&self) -> DomainResult<Vec<InstanceSummary>> {
        let mut state = self.state.write().await;
        state.list_calls += 1;
        if let Some(reason) = &state.listing_failure {
            return Err(DomainError::collaborator("*", reason.clone()));
        }
        Ok(state
            .instances
            .iter()
            .map(|(id, instance)| InstanceSummary::new(id.clone(), instance.state))
            .collect())
    }

    async fn fetch_transcript(&self, instance_id: &str, max_lines: usize) -> DomainResult<String> {
        let state = self.state.read().await;
        let instance = state
            .instances
            .get(instance_id)
            .ok_or_else(|| unknown(instance_id))?;
        if let Some(reason) = &instance.fetch_failure {
            return Err(DomainError::collaborator(instance_id, reason.clone()));
        }

        let lines: Vec<&str> = instance.transcript.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Ok(lines[start..].join("\n"))
    }

    async fn send_message(
        &self,
        instance_id: &str,
        text: &str,
        options: SendOptions,
    ) -> DomainResult<MessageAck> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get(instance_id)
            .ok_or_else(|| unknown(instance_id))?;
        if let Some(reason) = &instance.send_failure {
            return Err(DomainError::collaborator(instance_id, reason.clone()));
        }

        state.sent.push(SentMessage {
            instance_id: instance_id.to_string(),
            text: text.to_string(),
            options,
            sent_at: Utc::now(),
        });
        Ok(MessageAck {
            delivered: true,
            response: None,
        })
    }
}
