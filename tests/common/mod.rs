//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use std::sync::Arc;

use warden::{
    EventBus, InstanceState, ProgressTracker, ScriptedInstanceManager, SupervisorAgent,
    SupervisorConfig,
};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Supervisor config with no cooldown and a long interval, so tests drive
/// cycles explicitly.
#[allow(dead_code)]
pub fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        intervention_cooldown_seconds: 0,
        evaluation_interval_seconds: 3600,
        ..SupervisorConfig::default()
    }
}

/// Everything a supervisor test needs, wired together.
#[allow(dead_code)]
pub struct Harness {
    pub manager: Arc<ScriptedInstanceManager>,
    pub bus: Arc<EventBus>,
    pub tracker: Arc<ProgressTracker>,
    pub agent: SupervisorAgent,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new(config: SupervisorConfig, instances: &[&str]) -> Self {
        let manager = Arc::new(ScriptedInstanceManager::new());
        for id in instances {
            manager.add_instance(*id, InstanceState::Running).await;
        }
        let bus = Arc::new(EventBus::new());
        let tracker = Arc::new(ProgressTracker::new(bus.clone()));
        let agent = SupervisorAgent::new(manager.clone(), tracker.clone(), config);
        Self {
            manager,
            bus,
            tracker,
            agent,
        }
    }
}

/// Wait for an async condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
#[allow(dead_code)]
pub async fn wait_for<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    predicate().await
}
