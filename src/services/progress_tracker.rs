//! Task and milestone tracking.
//!
//! The tracker is the only owner of [`Task`] records. Callers receive clones,
//! and every structural change happens under one scoped write lock, so no
//! reader can observe a half-applied update. Lifecycle events are published on
//! the shared [`EventBus`] after the lock has been released.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Event, EventData, EventType, ProgressSnapshot, Task, TaskStatus};
use crate::services::event_bus::EventBus;

const SOURCE: &str = "progress_tracker";

#[derive(Default)]
struct TrackerState {
    tasks: HashMap<Uuid, Task>,
    /// Insertion order of task ids.
    order: Vec<Uuid>,
    milestones: Vec<String>,
}

impl TrackerState {
    fn ordered_tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }
}

/// Shared, concurrency-safe task and milestone store.
pub struct ProgressTracker {
    state: RwLock<TrackerState>,
    event_bus: Arc<EventBus>,
}

impl ProgressTracker {
    /// Create an empty tracker publishing to `event_bus`.
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            event_bus,
        }
    }

    /// Bus that lifecycle events are published on.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Create a task and publish `task.started`.
    pub async fn add_task(&self, description: impl Into<String>, assigned_to: Option<String>) -> Uuid {
        let task = Task::new(description, assigned_to);
        let task_id = task.id;

        let mut data = EventData::new();
        data.insert("task_id".to_string(), json!(task_id));
        data.insert("description".to_string(), json!(task.description));
        data.insert("assigned_to".to_string(), json!(task.assigned_to));

        {
            let mut state = self.state.write().await;
            state.order.push(task_id);
            state.tasks.insert(task_id, task);
        }

        tracing::debug!(task_id = %task_id, "task added");
        self.event_bus
            .publish(&Event::new(EventType::TaskStarted, SOURCE, data))
            .await;
        task_id
    }

    /// Move a task to `status` and publish the matching lifecycle event.
    ///
    /// Completed publishes `task.completed`, failed publishes `task.failed`
    /// and blocked publishes `blocker.detected`. Pending and in-progress
    /// transitions are silent.
    pub async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        blocker: Option<String>,
    ) -> DomainResult<Task> {
        let (updated, previous) = {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get_mut(&task_id)
                .ok_or(DomainError::TaskNotFound(task_id))?;
            let previous = task.status;
            task.transition(status, blocker);
            (task.clone(), previous)
        };

        tracing::debug!(
            task_id = %task_id,
            from = %previous,
            to = %status,
            "task status updated"
        );

        let event_type = match status {
            TaskStatus::Completed => Some(EventType::TaskCompleted),
            TaskStatus::Failed => Some(EventType::TaskFailed),
            TaskStatus::Blocked => Some(EventType::BlockerDetected),
            TaskStatus::Pending | TaskStatus::InProgress => None,
        };

        if let Some(event_type) = event_type {
            let mut data = EventData::new();
            data.insert("task_id".to_string(), json!(task_id));
            data.insert("description".to_string(), json!(updated.description));
            data.insert("previous_status".to_string(), json!(previous.as_str()));
            if let Some(blocker) = &updated.blocker {
                data.insert("blocker".to_string(), json!(blocker));
            }
            self.event_bus
                .publish(&Event::new(event_type, SOURCE, data))
                .await;
        }

        Ok(updated)
    }

    /// Record a milestone and publish `milestone.reached`.
    pub async fn add_milestone(&self, description: impl Into<String>) {
        let description = description.into();
        let count = {
            let mut state = self.state.write().await;
            state.milestones.push(description.clone());
            state.milestones.len()
        };

        let mut data = EventData::new();
        data.insert("milestone".to_string(), json!(description));
        data.insert("milestone_count".to_string(), json!(count));
        self.event_bus
            .publish(&Event::new(EventType::MilestoneReached, SOURCE, data))
            .await;
    }

    /// Publish `tool.executed` for a tool call observed in a transcript.
    pub async fn record_tool_execution(&self, tool_name: &str, arguments: Value) {
        let mut data = EventData::new();
        data.insert("tool_name".to_string(), json!(tool_name));
        data.insert("arguments".to_string(), arguments);
        self.event_bus
            .publish(&Event::new(EventType::ToolExecuted, SOURCE, data))
            .await;
    }

    /// Point-in-time counts over all tracked tasks.
    pub async fn get_snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read().await;
        ProgressSnapshot::from_tasks(state.ordered_tasks(), &state.milestones)
    }

    /// All tasks in creation order.
    pub async fn get_all_tasks(&self) -> Vec<Task> {
        self.state.read().await.ordered_tasks().cloned().collect()
    }

    /// Look up one task.
    pub async fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.state.read().await.tasks.get(&task_id).cloned()
    }

    /// Milestones in recording order.
    pub async fn get_milestones(&self) -> Vec<String> {
        self.state.read().await.milestones.clone()
    }
}
