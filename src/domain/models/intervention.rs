//! Detected issues and the interventions taken in response.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{validate_confidence, DomainResult};

/// How serious a detected issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Informational; no action strictly required.
    Info,
    /// Likely needs attention.
    Warning,
    /// Work is failing.
    Error,
    /// Reserved for issues raised outside the built-in detectors.
    Critical,
}

impl IssueSeverity {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of problem detected on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// The instance reports a blocker or has gone quiet.
    Stuck,
    /// Everything tracked is done and nothing is in progress.
    Waiting,
    /// Failures have piled up past the error-loop threshold.
    ErrorLoop,
    /// Anything raised outside the built-in detectors.
    Other(String),
}

impl IssueType {
    /// Wire name; custom issue types use their own name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stuck => "stuck",
            Self::Waiting => "waiting",
            Self::ErrorLoop => "error_loop",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue found during one evaluation cycle. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedIssue {
    instance_id: String,
    issue_type: IssueType,
    severity: IssueSeverity,
    description: String,
    detected_at: DateTime<Utc>,
    confidence: f64,
    evidence: HashMap<String, serde_json::Value>,
}

impl DetectedIssue {
    /// Create an issue, rejecting a confidence outside `[0, 1]`.
    pub fn new(
        instance_id: impl Into<String>,
        issue_type: IssueType,
        severity: IssueSeverity,
        description: impl Into<String>,
        confidence: f64,
    ) -> DomainResult<Self> {
        Ok(Self {
            instance_id: instance_id.into(),
            issue_type,
            severity,
            description: description.into(),
            detected_at: Utc::now(),
            confidence: validate_confidence(confidence)?,
            evidence: HashMap::new(),
        })
    }

    /// Attach a piece of supporting evidence.
    pub fn with_evidence(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    /// Instance the issue was detected on.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Kind of issue.
    pub fn issue_type(&self) -> &IssueType {
        &self.issue_type
    }

    /// How serious the issue is.
    pub fn severity(&self) -> IssueSeverity {
        self.severity
    }

    /// Human-readable summary.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Detection time.
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Detector confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Supporting evidence keyed by name.
    pub fn evidence(&self) -> &HashMap<String, serde_json::Value> {
        &self.evidence
    }
}

/// Remediation chosen for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    /// Ask the instance to report its status.
    StatusCheck,
    /// Flag the instance for new work.
    ReassignWork,
    /// Send error recovery guidance.
    ProvideGuidance,
}

impl InterventionType {
    /// Fixed mapping from issue type to intervention.
    pub fn for_issue(issue_type: &IssueType) -> Self {
        match issue_type {
            IssueType::Waiting => Self::ReassignWork,
            IssueType::ErrorLoop => Self::ProvideGuidance,
            IssueType::Stuck | IssueType::Other(_) => Self::StatusCheck,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusCheck => "status_check",
            Self::ReassignWork => "reassign_work",
            Self::ProvideGuidance => "provide_guidance",
        }
    }

    /// Templated instruction sent to the instance.
    pub fn message_template(&self) -> &'static str {
        match self {
            Self::StatusCheck => {
                "[Supervisor] Status check: you appear to be stuck. Summarize your current \
                 progress, list anything blocking you, and state the next concrete step you \
                 will take."
            }
            Self::ReassignWork => {
                "[Supervisor] Your tracked work is complete. Stand by while new work is \
                 assigned to you."
            }
            Self::ProvideGuidance => {
                "[Supervisor] Repeated failures detected. Stop retrying the same command. \
                 Re-read the most recent error output, identify the root cause, and try a \
                 different approach."
            }
        }
    }

    /// Human-readable description of the action.
    pub fn action_description(&self) -> &'static str {
        match self {
            Self::StatusCheck => "sent status check request",
            Self::ReassignWork => "flagged instance for work reassignment",
            Self::ProvideGuidance => "sent error recovery guidance",
        }
    }

    /// Whether executing this intervention sends a message to the instance.
    pub fn sends_message(&self) -> bool {
        !matches!(self, Self::ReassignWork)
    }
}

impl std::fmt::Display for InterventionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionOutcome {
    /// Intent recorded, nothing confirmed yet.
    Pending,
    /// The instance manager accepted and delivered the message.
    Succeeded,
    /// The send failed or was not delivered.
    Failed,
}

impl InterventionOutcome {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// One intervention taken against an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Remediation applied.
    pub intervention_type: InterventionType,
    /// Instance the intervention targeted.
    pub target_instance_id: String,
    /// Reservation time; also the cooldown stamp.
    pub timestamp: DateTime<Utc>,
    /// Description of the issue that triggered it.
    pub reason: String,
    /// What was done.
    pub action_taken: String,
    /// Execution outcome.
    pub success: InterventionOutcome,
    /// Issue type, severity, confidence, evidence and any error.
    pub details: HashMap<String, serde_json::Value>,
}

impl InterventionRecord {
    /// Create a pending record.
    pub fn new(
        intervention_type: InterventionType,
        target_instance_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            intervention_type,
            target_instance_id: target_instance_id.into(),
            timestamp,
            reason: reason.into(),
            action_taken: intervention_type.action_description().to_string(),
            success: InterventionOutcome::Pending,
            details: HashMap::new(),
        }
    }

    /// Set the execution outcome. Only the first call takes effect.
    pub fn complete(&mut self, outcome: InterventionOutcome) {
        if self.success == InterventionOutcome::Pending {
            self.success = outcome;
        }
    }

    /// Whether the outcome is still unknown.
    pub fn is_pending(&self) -> bool {
        self.success == InterventionOutcome::Pending
    }
}
