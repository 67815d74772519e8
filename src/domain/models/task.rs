//! Task domain model.
//!
//! Tasks are units of work an instance has announced in its transcript.
//! They are owned and mutated exclusively by the progress tracker; everyone
//! else sees clones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is known but not yet picked up
    Pending,
    /// Task is being worked on
    InProgress,
    /// Task finished successfully
    Completed,
    /// Task failed
    Failed,
    /// Task cannot progress until a blocker is resolved
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Wire name, as used in event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Tracker-assigned id.
    pub id: Uuid,
    /// Task text as extracted from the transcript.
    pub description: String,
    /// Current status.
    pub status: TaskStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// Instance working on the task, if known.
    pub assigned_to: Option<String>,
    /// Blocker summary; only set while blocked.
    pub blocker: Option<String>,
    /// Free-form annotations.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a task that is already being worked on.
    pub fn new(description: impl Into<String>, assigned_to: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: TaskStatus::InProgress,
            created_at: now,
            updated_at: now,
            assigned_to,
            blocker: None,
            metadata: HashMap::new(),
        }
    }

    /// Move to `status`. A blocker is only retained while blocked.
    pub fn transition(&mut self, status: TaskStatus, blocker: Option<String>) {
        self.status = status;
        self.blocker = if status == TaskStatus::Blocked { blocker } else { None };
        self.updated_at = Utc::now();
    }
}

/// Point-in-time view of the tracked task set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Number of tracked tasks.
    pub total_tasks: usize,
    /// Tasks in `Completed`.
    pub completed: usize,
    /// Tasks in `InProgress`.
    pub in_progress: usize,
    /// Tasks in `Blocked`.
    pub blocked: usize,
    /// Tasks in `Failed`.
    pub failed: usize,
    /// `completed / total_tasks * 100`, or 0 with no tasks.
    pub completion_percentage: f64,
    /// Milestones in the order they were recorded.
    pub milestones: Vec<String>,
}

impl ProgressSnapshot {
    /// Compute a snapshot from a task set and milestone list.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>, milestones: &[String]) -> Self {
        let mut total_tasks = 0;
        let mut completed = 0;
        let mut in_progress = 0;
        let mut blocked = 0;
        let mut failed = 0;

        for task in tasks {
            total_tasks += 1;
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::InProgress => in_progress += 1,
                TaskStatus::Blocked => blocked += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Pending => {}
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let completion_percentage = if total_tasks == 0 {
            0.0
        } else {
            completed as f64 / total_tasks as f64 * 100.0
        };

        Self {
            timestamp: Utc::now(),
            total_tasks,
            completed,
            in_progress,
            blocked,
            failed,
            completion_percentage,
            milestones: milestones.to_vec(),
        }
    }

    /// Empty snapshot, used before any task was tracked.
    pub fn empty() -> Self {
        Self::from_tasks(std::iter::empty(), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!(TaskStatus::InProgress.as_str())
        );
    }

    #[test]
    fn test_new_task_starts_in_progress() {
        let task = Task::new("write parser", Some("inst-1".to_string()));
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(task.assigned_to.as_deref(), Some("inst-1"));
    }

    #[test]
    fn test_transition_clears_blocker_when_unblocked() {
        let mut task = Task::new("deploy", None);
        task.transition(TaskStatus::Blocked, Some("no credentials".to_string()));
        assert_eq!(task.blocker.as_deref(), Some("no credentials"));

        task.transition(TaskStatus::InProgress, Some("ignored".to_string()));
        assert!(task.blocker.is_none());
        assert!(task.updated_at >= task.created_at);
    }

    #[test]
    fn test_snapshot_counts() {
        let mut a = Task::new("a", None);
        let mut b = Task::new("b", None);
        let c = Task::new("c", None);
        let mut d = Task::new("d", None);
        a.transition(TaskStatus::Completed, None);
        b.transition(TaskStatus::Failed, None);
        d.transition(TaskStatus::Pending, None);

        let snapshot = ProgressSnapshot::from_tasks([&a, &b, &c, &d], &["m1".to_string()]);

        assert_eq!(snapshot.total_tasks, 4);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.in_progress, 1);
        assert_eq!(snapshot.blocked, 0);
        assert!((snapshot.completion_percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.milestones, vec!["m1".to_string()]);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ProgressSnapshot::empty();
        assert_eq!(snapshot.total_tasks, 0);
        assert!(snapshot.completion_percentage.abs() < f64::EPSILON);
    }
}
