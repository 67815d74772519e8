//! Intervention policy and bookkeeping.
//!
//! All per-instance counters live in [`Bookkeeping`], which the agent keeps
//! behind a single mutex. A decision that lets an intervention through
//! reserves it immediately (count, cooldown stamp and a pending history
//! record) so two concurrent evaluations of the same instance cannot both pass
//! the checks.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::models::{
    DetectedIssue, InterventionOutcome, InterventionRecord, InterventionType, SupervisorConfig,
};

/// Why an issue was escalated instead of handled automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationReason {
    /// The instance already received the maximum number of interventions.
    LimitReached { interventions: u32, limit: u32 },
    /// The most recent interventions all failed.
    RepeatedFailures { consecutive_failures: u32 },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LimitReached {
                interventions,
                limit,
            } => write!(f, "intervention limit reached ({interventions}/{limit})"),
            Self::RepeatedFailures {
                consecutive_failures,
            } => write!(f, "{consecutive_failures} consecutive interventions failed"),
        }
    }
}

/// What `handle_issue` did with an issue.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    /// An intervention was executed and recorded.
    Intervened(InterventionRecord),
    /// The instance is inside its cooldown window.
    CoolingDown,
    /// Automated remediation is exhausted for this instance.
    Escalated(EscalationReason),
}

/// Result of the locked decision step.
#[derive(Debug)]
pub(crate) enum Decision {
    /// Reserved; the record is already in the history as pending.
    Proceed(InterventionRecord),
    CoolingDown,
    Escalate(EscalationReason),
}

/// Lifetime counters, unaffected by history rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LifetimeTotals {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub escalations: u64,
}

#[derive(Debug)]
pub(crate) struct Bookkeeping {
    counts: HashMap<String, u32>,
    last_intervention: HashMap<String, DateTime<Utc>>,
    failure_streaks: HashMap<String, u32>,
    intervened: BTreeSet<String>,
    history: VecDeque<InterventionRecord>,
    max_history: usize,
    totals: LifetimeTotals,
}

impl Bookkeeping {
    pub fn new(max_history: usize) -> Self {
        Self {
            counts: HashMap::new(),
            last_intervention: HashMap::new(),
            failure_streaks: HashMap::new(),
            intervened: BTreeSet::new(),
            history: VecDeque::new(),
            max_history: max_history.max(1),
            totals: LifetimeTotals::default(),
        }
    }

    /// Apply the policy to `issue`, reserving the intervention when allowed.
    pub fn decide(
        &mut self,
        issue: &DetectedIssue,
        config: &SupervisorConfig,
        now: DateTime<Utc>,
    ) -> Decision {
        let instance_id = issue.instance_id();

        let count = self.intervention_count(instance_id);
        if count >= config.max_interventions_per_instance {
            self.totals.escalations += 1;
            return Decision::Escalate(EscalationReason::LimitReached {
                interventions: count,
                limit: config.max_interventions_per_instance,
            });
        }

        let streak = self.failure_streaks.get(instance_id).copied().unwrap_or(0);
        if streak >= config.escalation_threshold {
            self.totals.escalations += 1;
            return Decision::Escalate(EscalationReason::RepeatedFailures {
                consecutive_failures: streak,
            });
        }

        if let Some(last) = self.last_intervention.get(instance_id) {
            if now - *last < config.intervention_cooldown() {
                return Decision::CoolingDown;
            }
        }

        let intervention_type = InterventionType::for_issue(issue.issue_type());
        let mut record =
            InterventionRecord::new(intervention_type, instance_id, now, issue.description());
        record
            .details
            .insert("issue_type".to_string(), json!(issue.issue_type().as_str()));
        record
            .details
            .insert("severity".to_string(), json!(issue.severity().as_str()));
        record
            .details
            .insert("confidence".to_string(), json!(issue.confidence()));
        if !issue.evidence().is_empty() {
            record
                .details
                .insert("evidence".to_string(), json!(issue.evidence()));
        }

        *self.counts.entry(instance_id.to_string()).or_insert(0) += 1;
        self.last_intervention.insert(instance_id.to_string(), now);
        self.intervened.insert(instance_id.to_string());
        self.totals.total += 1;
        self.push_history(record.clone());

        Decision::Proceed(record)
    }

    /// Store the execution outcome of a reserved intervention.
    pub fn complete(
        &mut self,
        record_id: Uuid,
        instance_id: &str,
        outcome: InterventionOutcome,
        error: Option<&str>,
    ) {
        if let Some(record) = self.history.iter_mut().rev().find(|r| r.id == record_id) {
            record.complete(outcome);
            if let Some(error) = error {
                record.details.insert("error".to_string(), json!(error));
            }
        }

        match outcome {
            InterventionOutcome::Succeeded => {
                self.totals.succeeded += 1;
                self.failure_streaks.remove(instance_id);
            }
            InterventionOutcome::Failed => {
                self.totals.failed += 1;
                *self
                    .failure_streaks
                    .entry(instance_id.to_string())
                    .or_insert(0) += 1;
            }
            InterventionOutcome::Pending => {}
        }
    }

    /// Forget an instance's count and failure streak. The cooldown stamp is
    /// kept so records for one instance stay at least a cooldown apart.
    pub fn reset_instance(&mut self, instance_id: &str) -> bool {
        let had_count = self.counts.remove(instance_id).is_some();
        let had_streak = self.failure_streaks.remove(instance_id).is_some();
        had_count || had_streak
    }

    pub fn intervention_count(&self, instance_id: &str) -> u32 {
        self.counts.get(instance_id).copied().unwrap_or(0)
    }

    pub fn history(&self) -> impl Iterator<Item = &InterventionRecord> {
        self.history.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.history.iter().filter(|r| r.is_pending()).count()
    }

    pub fn intervened(&self) -> impl Iterator<Item = &String> {
        self.intervened.iter()
    }

    pub fn totals(&self) -> LifetimeTotals {
        self.totals
    }

    fn push_history(&mut self, record: InterventionRecord) {
        while self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}
