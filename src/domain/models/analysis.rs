//! Transcript analysis result model.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::errors::{validate_confidence, DomainResult};

/// Overall state inferred from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Work is underway with nothing blocking it.
    InProgress,
    /// At least one milestone was reported.
    Completed,
    /// Blockers were reported and no milestone.
    Blocked,
    /// Extraction itself failed; the failure is the sole blocker.
    Error,
}

impl AnalysisStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }

    /// Derive status from what was extracted.
    ///
    /// Milestones take precedence over blockers.
    pub fn derive(has_blockers: bool, has_milestones: bool) -> Self {
        if has_milestones {
            Self::Completed
        } else if has_blockers {
            Self::Blocked
        } else {
            Self::InProgress
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome of analysing a message sequence.
///
/// Construction validates `confidence`; there is no way to build a result
/// with a confidence outside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    status: AnalysisStatus,
    tasks: Vec<String>,
    blockers: Vec<String>,
    milestones: Vec<String>,
    confidence: f64,
    metadata: HashMap<String, serde_json::Value>,
}

impl AnalysisResult {
    /// Build a result, rejecting a confidence outside `[0, 1]`.
    pub fn new(
        status: AnalysisStatus,
        tasks: Vec<String>,
        blockers: Vec<String>,
        milestones: Vec<String>,
        confidence: f64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> DomainResult<Self> {
        let confidence = validate_confidence(confidence)?;
        Ok(Self {
            status,
            tasks,
            blockers,
            milestones,
            confidence,
            metadata,
        })
    }

    /// Result reported when extraction fails internally.
    pub fn error(description: impl Into<String>) -> Self {
        let description = description.into();
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::Value::String(description.clone()));
        Self {
            status: AnalysisStatus::Error,
            tasks: Vec::new(),
            blockers: vec![description],
            milestones: Vec::new(),
            confidence: 0.0,
            metadata,
        }
    }

    /// Inferred status.
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    /// Task snippets in first-seen order.
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Blocker snippets in first-seen order.
    pub fn blockers(&self) -> &[String] {
        &self.blockers
    }

    /// Milestone snippets in first-seen order.
    pub fn milestones(&self) -> &[String] {
        &self.milestones
    }

    /// Confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Extra analysis details such as match counts.
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }
}
