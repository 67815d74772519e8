//! Service layer: analysis, tracking, eventing and supervision.

pub mod event_bus;
pub mod progress_tracker;
pub mod supervision_coordinator;
pub mod supervisor_agent;
pub mod transcript_analyzer;

pub use event_bus::{DeliveryReport, EventBus, EventHandlerFn, SubscriptionId};
pub use progress_tracker::ProgressTracker;
pub use supervision_coordinator::{CoordinationResult, SupervisionCoordinator};
pub use supervisor_agent::{
    CycleReport, EscalationReason, NetworkHealthSummary, PolicyOutcome, SupervisorAgent,
};
pub use transcript_analyzer::{confidence_for_matches, PatternFamily, TranscriptAnalyzer};
