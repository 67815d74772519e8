//! Supervisor agent: the autonomous control loop.
//!
//! Every evaluation interval the agent lists the active instances, reads the
//! tail of each transcript, detects issues and applies the intervention
//! policy. Interventions are rate limited per instance (cooldown plus a hard
//! cap); when the cap is hit, or interventions keep failing, the issue is
//! escalated to a human instead. Escalations are logged on the
//! `warden::escalation` target at ERROR level.
//!
//! Instance manager failures never leave the loop: a failed fetch means no
//! issues for that instance this cycle, and a failed send is recorded as a
//! failed intervention.

mod detection;
mod health;
mod policy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::models::{
    DetectedIssue, InterventionOutcome, InterventionRecord, Message, SupervisorConfig,
};
use crate::domain::ports::{InstanceManager, SendOptions};
use crate::services::progress_tracker::ProgressTracker;
use crate::services::transcript_analyzer::TranscriptAnalyzer;

pub use detection::{detect_issues, DetectionInput, StalenessTracker};
pub use health::{CycleReport, NetworkHealthSummary};
pub use policy::{EscalationReason, PolicyOutcome};

use policy::{Bookkeeping, Decision};

/// Log target for escalations.
pub const ESCALATION_TARGET: &str = "warden::escalation";

struct LoopHandle {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

/// State shared between the agent handle and its evaluation loop.
struct AgentCore {
    instance_manager: Arc<dyn InstanceManager>,
    tracker: Arc<ProgressTracker>,
    analyzer: TranscriptAnalyzer,
    config: SupervisorConfig,
    bookkeeping: Mutex<Bookkeeping>,
    staleness: Mutex<StalenessTracker>,
    running: AtomicBool,
}

/// Autonomous supervisor for a fleet of instances.
pub struct SupervisorAgent {
    core: Arc<AgentCore>,
    loop_handle: Mutex<Option<LoopHandle>>,
}

impl SupervisorAgent {
    /// Create a stopped agent with the default analyzer.
    pub fn new(
        instance_manager: Arc<dyn InstanceManager>,
        tracker: Arc<ProgressTracker>,
        config: SupervisorConfig,
    ) -> Self {
        Self::with_analyzer(instance_manager, tracker, TranscriptAnalyzer::default(), config)
    }

    /// Create a stopped agent with a custom analyzer.
    pub fn with_analyzer(
        instance_manager: Arc<dyn InstanceManager>,
        tracker: Arc<ProgressTracker>,
        analyzer: TranscriptAnalyzer,
        config: SupervisorConfig,
    ) -> Self {
        let bookkeeping = Bookkeeping::new(config.max_history);
        Self {
            core: Arc::new(AgentCore {
                instance_manager,
                tracker,
                analyzer,
                config,
                bookkeeping: Mutex::new(bookkeeping),
                staleness: Mutex::new(StalenessTracker::new()),
                running: AtomicBool::new(false),
            }),
            loop_handle: Mutex::new(None),
        }
    }

    /// Configuration fixed at construction.
    pub fn config(&self) -> &SupervisorConfig {
        &self.core.config
    }

    /// Spawn the evaluation loop. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut slot = self.loop_handle.lock().await;
        if slot.is_some() {
            warn!("supervisor already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let core = Arc::clone(&self.core);
        let interval = core.config.evaluation_interval();

        core.running.store(true, Ordering::Release);
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    () = async {
                        core.evaluate_network().await;
                        tokio::time::sleep(interval).await;
                    } => {}
                }
            }
            debug!("supervisor loop exited");
        });

        *slot = Some(LoopHandle { shutdown, join });
        info!(
            interval_secs = self.core.config.evaluation_interval_seconds,
            "supervisor started"
        );
    }

    /// Stop the loop and wait for it to exit. Does nothing if not running.
    pub async fn stop(&self) {
        let Some(LoopHandle { shutdown, join }) = self.loop_handle.lock().await.take() else {
            return;
        };

        // The receiver may already be gone if the loop ended on its own.
        let _ = shutdown.send(());
        if let Err(err) = join.await {
            error!(error = %err, "supervisor loop terminated abnormally");
        }

        self.core.running.store(false, Ordering::Release);
        info!("supervisor stopped");
    }

    /// Whether the evaluation loop is running.
    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Run one evaluation cycle over every active instance.
    pub async fn evaluate_network(&self) -> CycleReport {
        self.core.evaluate_network().await
    }

    /// Apply the intervention policy to a single issue.
    pub async fn handle_issue(&self, issue: &DetectedIssue) -> PolicyOutcome {
        self.core.handle_issue(issue).await
    }

    /// Intervention totals, tracker progress and loop state.
    pub async fn get_network_health_summary(&self) -> NetworkHealthSummary {
        let progress_snapshot = self.core.tracker.get_snapshot().await;
        let books = self.core.bookkeeping.lock().await;
        let totals = books.totals();

        NetworkHealthSummary {
            total_interventions: totals.total,
            active_issues: books.pending_count(),
            successful_interventions: totals.succeeded,
            failed_interventions: totals.failed,
            escalations: totals.escalations,
            progress_snapshot,
            instances_intervened: books.intervened().cloned().collect(),
            running: self.is_running(),
        }
    }

    /// Retained interventions, oldest first.
    pub async fn intervention_history(&self) -> Vec<InterventionRecord> {
        self.core.bookkeeping.lock().await.history().cloned().collect()
    }

    /// Interventions counted against `instance_id`'s limit.
    pub async fn intervention_count(&self, instance_id: &str) -> u32 {
        self.core
            .bookkeeping
            .lock()
            .await
            .intervention_count(instance_id)
    }

    /// Clear an instance's count, failure streak and idle clock, typically
    /// after a human has resolved its escalation. The cooldown still applies.
    pub async fn reset_instance(&self, instance_id: &str) -> bool {
        self.core.staleness.lock().await.forget(instance_id);
        let reset = self.core.bookkeeping.lock().await.reset_instance(instance_id);
        if reset {
            info!(instance_id, "instance supervision state reset");
        }
        reset
    }
}

impl AgentCore {
    async fn evaluate_network(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let instance_ids = match self.instance_manager.list_active_instance_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "failed to list instances; skipping cycle");
                return report;
            }
        };
        self.staleness.lock().await.retain_active(&instance_ids);

        let snapshot = self.tracker.get_snapshot().await;

        for instance_id in &instance_ids {
            report.instances_checked += 1;

            let transcript = match self
                .instance_manager
                .fetch_transcript(instance_id, self.config.transcript_max_lines)
                .await
            {
                Ok(text) => text,
                Err(err) => {
                    warn!(instance_id = %instance_id, error = %err, "transcript fetch failed");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let now = Utc::now();
            let idle = self
                .staleness
                .lock()
                .await
                .observe(instance_id, &transcript, now);

            let messages = Message::parse_transcript(&transcript, now);
            let analysis = if messages.is_empty() {
                None
            } else {
                match self.analyzer.analyze(&messages) {
                    Ok(analysis) => Some(analysis),
                    Err(err) => {
                        warn!(instance_id = %instance_id, error = %err, "transcript analysis rejected");
                        None
                    }
                }
            };

            let input = DetectionInput {
                instance_id,
                analysis: analysis.as_ref(),
                snapshot: &snapshot,
                idle,
            };
            let issues = match detect_issues(&input, &self.config) {
                Ok(issues) => issues,
                Err(err) => {
                    warn!(instance_id = %instance_id, error = %err, "issue detection failed");
                    continue;
                }
            };

            report.issues_detected += issues.len();
            for issue in &issues {
                match self.handle_issue(issue).await {
                    PolicyOutcome::Intervened(_) => report.interventions_recorded += 1,
                    PolicyOutcome::CoolingDown => report.skipped += 1,
                    PolicyOutcome::Escalated(_) => report.escalations += 1,
                }
            }
        }

        debug!(
            instances = report.instances_checked,
            issues = report.issues_detected,
            interventions = report.interventions_recorded,
            escalations = report.escalations,
            "evaluation cycle complete"
        );
        report
    }

    async fn handle_issue(&self, issue: &DetectedIssue) -> PolicyOutcome {
        let decision = self
            .bookkeeping
            .lock()
            .await
            .decide(issue, &self.config, Utc::now());

        let mut record = match decision {
            Decision::Proceed(record) => record,
            Decision::CoolingDown => {
                debug!(
                    instance_id = issue.instance_id(),
                    issue_type = %issue.issue_type(),
                    "instance in cooldown"
                );
                return PolicyOutcome::CoolingDown;
            }
            Decision::Escalate(reason) => {
                escalate(issue, reason);
                return PolicyOutcome::Escalated(reason);
            }
        };

        let (outcome, failure) = self.execute(&record).await;
        self.bookkeeping.lock().await.complete(
            record.id,
            &record.target_instance_id,
            outcome,
            failure.as_deref(),
        );

        record.complete(outcome);
        if let Some(reason) = failure {
            record
                .details
                .insert("error".to_string(), serde_json::json!(reason));
        }

        info!(
            instance_id = %record.target_instance_id,
            intervention = %record.intervention_type,
            outcome = record.success.as_str(),
            reason = %record.reason,
            "intervention recorded"
        );
        PolicyOutcome::Intervened(record)
    }

    /// Carry out an intervention. Returns the outcome and a failure reason.
    async fn execute(&self, record: &InterventionRecord) -> (InterventionOutcome, Option<String>) {
        let intervention = record.intervention_type;
        if !intervention.sends_message() {
            info!(
                instance_id = %record.target_instance_id,
                "work reassignment requested; awaiting scheduler"
            );
            return (InterventionOutcome::Pending, None);
        }

        let options = SendOptions {
            wait_for_response: false,
            timeout: self.config.message_timeout(),
        };
        match self
            .instance_manager
            .send_message(
                &record.target_instance_id,
                intervention.message_template(),
                options,
            )
            .await
        {
            Ok(ack) if ack.delivered => (InterventionOutcome::Succeeded, None),
            Ok(_) => (
                InterventionOutcome::Failed,
                Some("message was not delivered".to_string()),
            ),
            Err(err) => {
                warn!(
                    instance_id = %record.target_instance_id,
                    error = %err,
                    "intervention message failed"
                );
                (InterventionOutcome::Failed, Some(err.to_string()))
            }
        }
    }
}

fn escalate(issue: &DetectedIssue, reason: EscalationReason) {
    error!(
        target: ESCALATION_TARGET,
        instance_id = issue.instance_id(),
        issue_type = %issue.issue_type(),
        severity = %issue.severity(),
        description = issue.description(),
        reason = %reason,
        "automated remediation exhausted; human attention required"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instances::ScriptedInstanceManager;
    use crate::domain::models::{InterventionType, IssueSeverity, IssueType};
    use crate::domain::ports::InstanceState;
    use crate::services::event_bus::EventBus;

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            intervention_cooldown_seconds: 0,
            ..SupervisorConfig::default()
        }
    }

    async fn agent(config: SupervisorConfig) -> (SupervisorAgent, Arc<ScriptedInstanceManager>) {
        let manager = Arc::new(ScriptedInstanceManager::new());
        manager.add_instance("inst-1", InstanceState::Running).await;
        let tracker = Arc::new(ProgressTracker::new(Arc::new(EventBus::new())));
        let agent = SupervisorAgent::new(manager.clone(), tracker, config);
        (agent, manager)
    }

    fn issue(issue_type: IssueType) -> DetectedIssue {
        DetectedIssue::new("inst-1", issue_type, IssueSeverity::Warning, "test", 0.9).unwrap()
    }

    #[tokio::test]
    async fn test_status_check_sends_template() {
        let (agent, manager) = agent(config()).await;

        let outcome = agent.handle_issue(&issue(IssueType::Stuck)).await;

        let PolicyOutcome::Intervened(record) = outcome else {
            panic!("expected an intervention");
        };
        assert_eq!(record.intervention_type, InterventionType::StatusCheck);
        assert_eq!(record.success, InterventionOutcome::Succeeded);

        let sent = manager.sent_to("inst-1").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, InterventionType::StatusCheck.message_template());
        assert!(!sent[0].options.wait_for_response);
        assert_eq!(sent[0].options.timeout, agent.config().message_timeout());
    }

    #[tokio::test]
    async fn test_reassign_work_stays_pending() {
        let (agent, manager) = agent(config()).await;

        agent.handle_issue(&issue(IssueType::Waiting)).await;

        assert!(manager.sent_messages().await.is_empty());
        let summary = agent.get_network_health_summary().await;
        assert_eq!(summary.total_interventions, 1);
        assert_eq!(summary.active_issues, 1);
        assert_eq!(summary.successful_interventions, 0);
        assert_eq!(summary.failed_interventions, 0);
    }

    #[tokio::test]
    async fn test_send_failure_recorded_as_failed() {
        let (agent, manager) = agent(config()).await;
        manager.fail_send("inst-1", "pty closed").await.unwrap();

        let PolicyOutcome::Intervened(record) = agent.handle_issue(&issue(IssueType::ErrorLoop)).await
        else {
            panic!("expected an intervention");
        };

        assert_eq!(record.intervention_type, InterventionType::ProvideGuidance);
        assert_eq!(record.success, InterventionOutcome::Failed);
        let history = agent.intervention_history().await;
        assert_eq!(history[0].success, InterventionOutcome::Failed);
        assert!(history[0].details["error"].as_str().unwrap().contains("pty closed"));
    }

    #[tokio::test]
    async fn test_blocked_transcript_triggers_status_check() {
        let (agent, manager) = agent(config()).await;
        manager
            .set_transcript("inst-1", "I'll wire up the deploy job\nBlocked by missing credentials")
            .await
            .unwrap();

        let report = agent.evaluate_network().await;

        assert_eq!(report.instances_checked, 1);
        assert_eq!(report.issues_detected, 1);
        assert_eq!(report.interventions_recorded, 1);
        assert_eq!(manager.sent_to("inst-1").await.len(), 1);
        assert_eq!(agent.intervention_count("inst-1").await, 1);
    }

    #[tokio::test]
    async fn test_reset_instance_after_escalation() {
        let (agent, _) = agent(SupervisorConfig {
            max_interventions_per_instance: 1,
            ..config()
        })
        .await;

        agent.handle_issue(&issue(IssueType::Stuck)).await;
        assert!(matches!(
            agent.handle_issue(&issue(IssueType::Stuck)).await,
            PolicyOutcome::Escalated(EscalationReason::LimitReached { .. })
        ));

        assert!(agent.reset_instance("inst-1").await);
        assert_eq!(agent.intervention_count("inst-1").await, 0);
        assert!(matches!(
            agent.handle_issue(&issue(IssueType::Stuck)).await,
            PolicyOutcome::Intervened(_)
        ));
        assert_eq!(agent.get_network_health_summary().await.escalations, 1);
    }

    #[tokio::test]
    async fn test_reset_instance_respects_cooldown() {
        let (agent, manager) = agent(SupervisorConfig {
            max_interventions_per_instance: 1,
            intervention_cooldown_seconds: 600,
            ..config()
        })
        .await;

        assert!(matches!(
            agent.handle_issue(&issue(IssueType::Stuck)).await,
            PolicyOutcome::Intervened(_)
        ));
        assert!(agent.reset_instance("inst-1").await);

        assert_eq!(
            agent.handle_issue(&issue(IssueType::Stuck)).await,
            PolicyOutcome::CoolingDown
        );
        assert_eq!(agent.intervention_history().await.len(), 1);
        assert_eq!(manager.sent_to("inst-1").await.len(), 1);
    }
}
