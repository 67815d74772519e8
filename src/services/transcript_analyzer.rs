//! Transcript analysis.
//!
//! Turns free-text agent transcripts into tasks, blockers and milestones
//! using three fixed, ordered families of phrasing patterns. The analysis is
//! deterministic: identical message sequences always produce identical
//! results.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AnalysisResult, AnalysisStatus, AnalyzerConfig, Message, MessageRole};

/// Which kind of signal a pattern extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFamily {
    /// Work the instance announces it will do.
    Task,
    /// Something preventing progress.
    Blocker,
    /// Work the instance reports as done.
    Milestone,
}

impl PatternFamily {
    /// Name used in analysis metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Blocker => "blocker",
            Self::Milestone => "milestone",
        }
    }
}

/// Pattern table: family, rule name, regex. Order is significant.
const PATTERN_TABLE: &[(PatternFamily, &str, &str)] = &[
    // Task-indicating phrasing
    (
        PatternFamily::Task,
        "first_person_intent",
        r"(?i)\b(?:I['’]ll|I will|I['’]m going to|I am going to|I need to|let me)\s+(.+)",
    ),
    (
        PatternFamily::Task,
        "next_step",
        r"(?i)\bnext(?:\s+step)?\s*[,:]?\s+(?:is to|I['’]ll|I will|we['’]ll|we will)\s+(.+)",
    ),
    (
        PatternFamily::Task,
        "working_on",
        r"(?i)\b(?:working on|starting on|now implementing)\s+(.+)",
    ),
    (PatternFamily::Task, "task_marker", r"(?i)\b(?:TODO|Task)\s*:\s*(.+)"),
    // Blocker-indicating phrasing
    (PatternFamily::Blocker, "blocked_by", r"(?i)\bblocked\s+(?:by|on)\s+(.+)"),
    (
        PatternFamily::Blocker,
        "error_marker",
        r"(?i)\b(?:error|exception|fatal)\s*:\s*(.+)",
    ),
    (PatternFamily::Blocker, "failed_to", r"(?i)\bfailed to\s+(.+)"),
    (
        PatternFamily::Blocker,
        "inability",
        r"(?i)\b(?:unable to|cannot|can['’]t|could not|couldn['’]t)\s+(.+)",
    ),
    (PatternFamily::Blocker, "waiting_on", r"(?i)\bwaiting (?:for|on)\s+(.+)"),
    (
        PatternFamily::Blocker,
        "access_denied",
        r"(?i)\b(?:permission|access) denied\b(.*)",
    ),
    // Milestone-indicating phrasing
    (PatternFamily::Milestone, "success", r"(?i)\bsuccessfully\s+(.+)"),
    (
        PatternFamily::Milestone,
        "finished",
        r"(?i)\b(?:finished|completed|done with)\s+(.+)",
    ),
    (
        PatternFamily::Milestone,
        "tests_passing",
        r"(?i)\ball (?:\d+ )?tests? (?:are |have )?pass(?:ing|ed|es)?\b",
    ),
    (PatternFamily::Milestone, "check_mark", r"[✓✔✅]\s*(.+)"),
    (
        PatternFamily::Milestone,
        "milestone_marker",
        r"(?i)\bmilestone(?:\s+reached)?\s*:\s*(.+)",
    ),
];

/// Characters trimmed from the end of every snippet.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '…', '-'];

/// A compiled matcher.
struct PatternRule {
    family: PatternFamily,
    name: &'static str,
    regex: Regex,
}

/// Per-family extraction state: ordered, case-insensitively deduplicated.
#[derive(Default)]
struct FamilyHits {
    items: Vec<String>,
    seen: HashSet<String>,
    matches: usize,
}

impl FamilyHits {
    fn push(&mut self, snippet: String) {
        if self.seen.insert(snippet.to_lowercase()) {
            self.items.push(snippet);
        }
    }
}

/// Map a total match count to a confidence score.
pub fn confidence_for_matches(match_count: usize) -> f64 {
    match match_count {
        0 => 0.0,
        1 => 0.4,
        2..=3 => 0.6,
        4..=6 => 0.8,
        _ => 0.95,
    }
}

/// Pattern-based transcript analyzer.
pub struct TranscriptAnalyzer {
    rules: Vec<PatternRule>,
    config: AnalyzerConfig,
}

impl Default for TranscriptAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl TranscriptAnalyzer {
    /// Compile the pattern table for `config`.
    pub fn new(config: AnalyzerConfig) -> Self {
        let rules = PATTERN_TABLE
            .iter()
            .map(|&(family, name, pattern)| PatternRule {
                family,
                name,
                regex: Regex::new(pattern).expect("hardcoded regex"),
            })
            .collect();
        Self { rules, config }
    }

    /// Active analyzer configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a non-empty message sequence.
    ///
    /// Empty input is a validation error. Any failure during extraction is
    /// reported as an `Error` result rather than returned.
    pub fn analyze(&self, messages: &[Message]) -> DomainResult<AnalysisResult> {
        if messages.is_empty() {
            return Err(DomainError::ValidationFailed(
                "cannot analyze an empty message sequence".to_string(),
            ));
        }

        match self.extract(messages) {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(error = %err, messages = messages.len(), "transcript extraction failed");
                Ok(AnalysisResult::error(err.to_string()))
            }
        }
    }

    fn extract(&self, messages: &[Message]) -> DomainResult<AnalysisResult> {
        let mut tasks = FamilyHits::default();
        let mut blockers = FamilyHits::default();
        let mut milestones = FamilyHits::default();
        let mut analyzed = 0usize;

        for message in messages.iter().filter(|m| self.is_analyzed_role(m.role)) {
            analyzed += 1;
            for rule in &self.rules {
                let hits = match rule.family {
                    PatternFamily::Task => &mut tasks,
                    PatternFamily::Blocker => &mut blockers,
                    PatternFamily::Milestone => &mut milestones,
                };
                for caps in rule.regex.captures_iter(&message.content) {
                    hits.matches += 1;
                    let raw = caps
                        .get(1)
                        .map(|m| m.as_str())
                        .filter(|s| !s.trim().is_empty())
                        .or_else(|| caps.get(0).map(|m| m.as_str()))
                        .unwrap_or_default();
                    let snippet = clean_snippet(raw, self.config.max_snippet_chars);
                    if snippet.is_empty() {
                        continue;
                    }
                    debug!(family = rule.family.as_str(), rule = rule.name, snippet = %snippet, "pattern matched");
                    hits.push(snippet);
                }
            }
        }

        let match_count = tasks.matches + blockers.matches + milestones.matches;
        let status = AnalysisStatus::derive(!blockers.items.is_empty(), !milestones.items.is_empty());

        let mut metadata = HashMap::new();
        metadata.insert("message_count".to_string(), json!(messages.len()));
        metadata.insert("analyzed_messages".to_string(), json!(analyzed));
        metadata.insert("match_count".to_string(), json!(match_count));
        metadata.insert("task_matches".to_string(), json!(tasks.matches));
        metadata.insert("blocker_matches".to_string(), json!(blockers.matches));
        metadata.insert("milestone_matches".to_string(), json!(milestones.matches));

        AnalysisResult::new(
            status,
            tasks.items,
            blockers.items,
            milestones.items,
            confidence_for_matches(match_count),
            metadata,
        )
    }

    fn is_analyzed_role(&self, role: MessageRole) -> bool {
        self.config.roles.contains(&role)
    }
}

/// Normalize whitespace, trim trailing punctuation and bound the length.
fn clean_snippet(raw: &str, max_chars: usize) -> String {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = normalized.trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace());
    truncate_snippet(trimmed, max_chars)
}

/// Cut at the last sentence boundary within `max_chars` (past half of it),
/// otherwise hard-truncate with an ellipsis.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let floor = max_chars / 2;
    let boundary = (floor..max_chars).rev().find(|&i| {
        matches!(chars[i], '.' | '!' | '?') && chars.get(i + 1).is_some_and(|c| c.is_whitespace())
    });

    if let Some(end) = boundary {
        let sentence: String = chars[..end].iter().collect();
        return sentence.trim_end().to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let head: String = chars[..keep].iter().collect();
    format!("{}...", head.trim_end())
}
