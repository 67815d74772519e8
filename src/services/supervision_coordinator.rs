//! Supervision coordinator.
//!
//! Glues the transcript analyzer to the progress tracker: one call turns a
//! batch of transcript messages into tracked tasks, blockers and milestones,
//! and announces the outcome on the event bus.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnalysisResult, Event, EventData, EventType, Message, ProgressSnapshot, TaskStatus,
};
use crate::services::event_bus::EventBus;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::transcript_analyzer::TranscriptAnalyzer;

const SOURCE: &str = "supervision_coordinator";

/// Number of blockers folded into the summary attached to a blocked task.
const BLOCKER_SUMMARY_LIMIT: usize = 3;

/// Outcome of one [`SupervisionCoordinator::analyze_and_track`] call.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationResult {
    /// Analyzer output for the batch.
    pub analysis: AnalysisResult,
    /// Ids of tasks created from this batch, in extraction order.
    pub task_ids: Vec<Uuid>,
    /// Tracker snapshot after the batch was applied.
    pub snapshot: ProgressSnapshot,
    /// Events emitted by the coordinator itself. Tracker lifecycle events are
    /// not counted.
    pub events_published: usize,
    /// Id attached to the `analysis.completed` event.
    pub correlation_id: Uuid,
}

/// Feeds analyzer output into the progress tracker.
pub struct SupervisionCoordinator {
    analyzer: TranscriptAnalyzer,
    tracker: Arc<ProgressTracker>,
    event_bus: Arc<EventBus>,
}

impl SupervisionCoordinator {
    /// Create a coordinator with an explicit event bus.
    pub fn new(
        analyzer: TranscriptAnalyzer,
        tracker: Arc<ProgressTracker>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            analyzer,
            tracker,
            event_bus,
        }
    }

    /// Coordinator sharing the tracker's event bus.
    pub fn with_tracker(analyzer: TranscriptAnalyzer, tracker: Arc<ProgressTracker>) -> Self {
        let event_bus = Arc::clone(tracker.event_bus());
        Self::new(analyzer, tracker, event_bus)
    }

    /// Tracker this coordinator writes to.
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Analyze `messages` and fold the findings into the tracker.
    ///
    /// Fails only when the analyzer rejects the input (an empty batch).
    pub async fn analyze_and_track(&self, messages: &[Message]) -> DomainResult<CoordinationResult> {
        let analysis = self.analyzer.analyze(messages)?;
        let correlation_id = Uuid::new_v4();

        for call in messages.iter().flat_map(|m| m.tool_calls.iter()) {
            self.tracker
                .record_tool_execution(&call.name, call.arguments.clone())
                .await;
        }

        let mut task_ids = Vec::with_capacity(analysis.tasks().len());
        for description in analysis.tasks() {
            task_ids.push(self.tracker.add_task(description.clone(), None).await);
        }

        if let (Some(first), false) = (task_ids.first(), analysis.blockers().is_empty()) {
            let summary = analysis
                .blockers()
                .iter()
                .take(BLOCKER_SUMMARY_LIMIT)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            self.tracker
                .update_status(*first, TaskStatus::Blocked, Some(summary))
                .await?;
        }

        for milestone in analysis.milestones() {
            self.tracker.add_milestone(milestone.clone()).await;
        }

        let mut data = EventData::new();
        data.insert("status".to_string(), json!(analysis.status().as_str()));
        data.insert("confidence".to_string(), json!(analysis.confidence()));
        data.insert("task_count".to_string(), json!(analysis.tasks().len()));
        data.insert("blocker_count".to_string(), json!(analysis.blockers().len()));
        data.insert("milestone_count".to_string(), json!(analysis.milestones().len()));
        data.insert("task_ids".to_string(), json!(task_ids));
        self.event_bus
            .publish(
                &Event::new(EventType::AnalysisCompleted, SOURCE, data)
                    .with_correlation_id(correlation_id),
            )
            .await;

        tracing::info!(
            correlation_id = %correlation_id,
            status = analysis.status().as_str(),
            tasks = task_ids.len(),
            blockers = analysis.blockers().len(),
            milestones = analysis.milestones().len(),
            "transcript analyzed and tracked"
        );

        Ok(CoordinationResult {
            analysis,
            task_ids,
            snapshot: self.tracker.get_snapshot().await,
            events_published: 1,
            correlation_id,
        })
    }

    /// Current tracker snapshot.
    pub async fn get_network_health(&self) -> ProgressSnapshot {
        self.tracker.get_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AnalysisStatus, ToolCall};
    use std::sync::Mutex as StdMutex;

    async fn coordinator() -> (SupervisionCoordinator, Arc<StdMutex<Vec<Event>>>) {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = log.clone();
        bus.subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        })
        .await;
        let tracker = Arc::new(ProgressTracker::new(bus));
        (
            SupervisionCoordinator::with_tracker(TranscriptAnalyzer::default(), tracker),
            log,
        )
    }

    #[tokio::test]
    async fn test_tasks_are_tracked() {
        let (coordinator, log) = coordinator().await;
        let messages = vec![
            Message::assistant("I'll implement the login endpoint"),
            Message::assistant("Let me add rate limiting next"),
        ];

        let result = coordinator.analyze_and_track(&messages).await.unwrap();

        assert_eq!(result.analysis.status(), AnalysisStatus::InProgress);
        assert_eq!(result.task_ids.len(), result.analysis.tasks().len());
        assert_eq!(result.snapshot.total_tasks, result.task_ids.len());
        assert_eq!(result.snapshot.in_progress, result.task_ids.len());
        assert_eq!(result.events_published, 1);

        let events = log.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::AnalysisCompleted);
        assert_eq!(last.correlation_id, Some(result.correlation_id));
        assert_eq!(last.get("task_count"), Some(&json!(result.task_ids.len())));
    }

    #[tokio::test]
    async fn test_first_task_blocked_with_summary() {
        let (coordinator, _) = coordinator().await;
        let messages = vec![
            Message::assistant("I'll deploy the staging stack"),
            Message::assistant("Blocked by missing credentials"),
            Message::assistant("Error: registry timeout"),
            Message::assistant("Unable to reach the artifact store"),
            Message::assistant("Waiting for the VPN to come up"),
        ];

        let result = coordinator.analyze_and_track(&messages).await.unwrap();
        let task = coordinator
            .tracker()
            .get_task(result.task_ids[0])
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Blocked);
        let summary = task.blocker.unwrap();
        assert_eq!(summary.split("; ").count(), BLOCKER_SUMMARY_LIMIT);
        assert!(summary.starts_with("missing credentials"));
        assert_eq!(result.snapshot.blocked, 1);
    }

    #[tokio::test]
    async fn test_blockers_without_tasks_leave_tracker_untouched() {
        let (coordinator, _) = coordinator().await;

        let result = coordinator
            .analyze_and_track(&[Message::assistant("Blocked by missing credentials")])
            .await
            .unwrap();

        assert!(result.task_ids.is_empty());
        assert_eq!(result.snapshot.total_tasks, 0);
        assert_eq!(result.snapshot.blocked, 0);
    }

    #[tokio::test]
    async fn test_milestones_recorded() {
        let (coordinator, _) = coordinator().await;

        let result = coordinator
            .analyze_and_track(&[Message::assistant(
                "Successfully implemented X, all tests passing",
            )])
            .await
            .unwrap();

        assert_eq!(result.analysis.status(), AnalysisStatus::Completed);
        assert_eq!(result.snapshot.milestones, result.analysis.milestones().to_vec());
        assert_eq!(
            coordinator.get_network_health().await.milestones.len(),
            result.analysis.milestones().len()
        );
    }

    #[tokio::test]
    async fn test_tool_calls_forwarded() {
        let (coordinator, log) = coordinator().await;
        let message = Message::assistant("running the formatter")
            .with_tool_call(ToolCall::new("bash", json!({"command": "cargo fmt"})));

        let result = coordinator.analyze_and_track(&[message]).await.unwrap();

        assert_eq!(result.events_published, 1);
        let events = log.lock().unwrap();
        assert_eq!(events[0].event_type, EventType::ToolExecuted);
        assert_eq!(events[0].get("tool_name"), Some(&json!("bash")));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (coordinator, log) = coordinator().await;

        let err = coordinator.analyze_and_track(&[]).await.unwrap_err();

        assert!(err.is_validation());
        assert!(log.lock().unwrap().is_empty());
    }
}
