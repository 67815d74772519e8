//! Reporting types for the supervisor.

use serde::Serialize;

use crate::domain::models::ProgressSnapshot;

/// Aggregate view of the supervised network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkHealthSummary {
    /// Interventions recorded since the agent was created.
    pub total_interventions: u64,
    /// Retained interventions whose outcome is still pending.
    pub active_issues: usize,
    /// Interventions whose send succeeded.
    pub successful_interventions: u64,
    /// Interventions whose send failed or was not delivered.
    pub failed_interventions: u64,
    /// Issues handed to a human because automated remediation was exhausted.
    pub escalations: u64,
    /// Tracker snapshot at the time of the call.
    pub progress_snapshot: ProgressSnapshot,
    /// Every instance that has received an intervention, sorted.
    pub instances_intervened: Vec<String>,
    /// Whether the evaluation loop is running.
    pub running: bool,
}

/// What one evaluation cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Active instances evaluated.
    pub instances_checked: usize,
    /// Instances whose transcript could not be fetched this cycle.
    pub fetch_failures: usize,
    /// Issues raised across all instances.
    pub issues_detected: usize,
    /// Interventions reserved and executed.
    pub interventions_recorded: usize,
    /// Issues skipped because the instance was cooling down.
    pub skipped: usize,
    /// Issues escalated to a human.
    pub escalations: usize,
}
