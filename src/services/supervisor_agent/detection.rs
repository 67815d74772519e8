//! Issue detection for a single instance.
//!
//! Detection is a pure function of the analyzer's view of the transcript, the
//! tracker snapshot and how long the transcript has been unchanged.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnalysisResult, AnalysisStatus, DetectedIssue, IssueSeverity, IssueType, ProgressSnapshot,
    SupervisorConfig,
};

const WAITING_CONFIDENCE: f64 = 0.9;
const ERROR_LOOP_CONFIDENCE: f64 = 0.95;
const IDLE_STUCK_CONFIDENCE: f64 = 0.7;
const IDLE_WAITING_CONFIDENCE: f64 = 0.8;

/// Everything detection looks at for one instance in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Instance being evaluated.
    pub instance_id: &'a str,
    /// `None` when the transcript had no non-blank lines.
    pub analysis: Option<&'a AnalysisResult>,
    /// Tracker snapshot for this cycle.
    pub snapshot: &'a ProgressSnapshot,
    /// How long the transcript has been unchanged.
    pub idle: Duration,
}

/// Derive the issues for one instance. At most one issue per type.
pub fn detect_issues(
    input: &DetectionInput<'_>,
    config: &SupervisorConfig,
) -> DomainResult<Vec<DetectedIssue>> {
    let mut issues = Vec::new();
    let status = input.analysis.map(AnalysisResult::status);

    if let Some(analysis) = input.analysis.filter(|a| a.status() == AnalysisStatus::Blocked) {
        issues.push(
            DetectedIssue::new(
                input.instance_id,
                IssueType::Stuck,
                IssueSeverity::Warning,
                format!("instance reports blockers: {}", analysis.blockers().join("; ")),
                analysis.confidence(),
            )?
            .with_evidence("blockers", json!(analysis.blockers())),
        );
    }

    if input.snapshot.in_progress == 0 && input.snapshot.completed >= 1 {
        issues.push(
            DetectedIssue::new(
                input.instance_id,
                IssueType::Waiting,
                IssueSeverity::Info,
                "all tracked work is complete and nothing is in progress",
                WAITING_CONFIDENCE,
            )?
            .with_evidence("completed", json!(input.snapshot.completed)),
        );
    }

    if input.snapshot.failed >= config.error_loop_threshold {
        issues.push(
            DetectedIssue::new(
                input.instance_id,
                IssueType::ErrorLoop,
                IssueSeverity::Error,
                format!("{} tracked tasks have failed", input.snapshot.failed),
                ERROR_LOOP_CONFIDENCE,
            )?
            .with_evidence("failed", json!(input.snapshot.failed)),
        );
    }

    let idle_seconds = input.idle.num_seconds().max(0);
    let raised = |issues: &[DetectedIssue], kind: &IssueType| {
        issues.iter().any(|issue| issue.issue_type() == kind)
    };

    // A finished instance going quiet is waiting for work, not stuck.
    if idle_seconds >= secs(config.stuck_threshold_seconds)
        && status != Some(AnalysisStatus::Completed)
        && !raised(&issues, &IssueType::Stuck)
    {
        issues.push(
            DetectedIssue::new(
                input.instance_id,
                IssueType::Stuck,
                IssueSeverity::Warning,
                format!("no transcript output for {idle_seconds}s"),
                IDLE_STUCK_CONFIDENCE,
            )?
            .with_evidence("idle_seconds", json!(idle_seconds)),
        );
    }

    if idle_seconds >= secs(config.waiting_threshold_seconds)
        && status == Some(AnalysisStatus::Completed)
        && !raised(&issues, &IssueType::Waiting)
    {
        issues.push(
            DetectedIssue::new(
                input.instance_id,
                IssueType::Waiting,
                IssueSeverity::Info,
                format!("reported completion and idle for {idle_seconds}s"),
                IDLE_WAITING_CONFIDENCE,
            )?
            .with_evidence("idle_seconds", json!(idle_seconds)),
        );
    }

    Ok(issues)
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy)]
struct Fingerprint {
    digest: u64,
    unchanged_since: DateTime<Utc>,
}

/// Remembers each instance's last transcript to measure idle time.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    fingerprints: HashMap<String, Fingerprint>,
}

impl StalenessTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest transcript and return how long it has been unchanged.
    pub fn observe(&mut self, instance_id: &str, transcript: &str, now: DateTime<Utc>) -> Duration {
        let digest = digest(transcript);
        match self.fingerprints.get_mut(instance_id) {
            Some(fp) if fp.digest == digest => now - fp.unchanged_since,
            Some(fp) => {
                *fp = Fingerprint {
                    digest,
                    unchanged_since: now,
                };
                Duration::zero()
            }
            None => {
                self.fingerprints.insert(
                    instance_id.to_string(),
                    Fingerprint {
                        digest,
                        unchanged_since: now,
                    },
                );
                Duration::zero()
            }
        }
    }

    /// Drop fingerprints for instances that are no longer active.
    pub fn retain_active(&mut self, active: &[String]) {
        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        self.fingerprints.retain(|id, _| active.contains(id.as_str()));
    }

    /// Drop one instance's fingerprint.
    pub fn forget(&mut self, instance_id: &str) {
        self.fingerprints.remove(instance_id);
    }

    /// Number of instances with a fingerprint.
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// Whether no fingerprints are held.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

fn digest(transcript: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    transcript.hash(&mut hasher);
    hasher.finish()
}
