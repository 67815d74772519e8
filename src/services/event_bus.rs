//! EventBus service for in-process event distribution.
//!
//! Delivery is synchronous: `publish` runs every matching handler, in
//! subscription order, before it returns. Each handler runs inside its own
//! error boundary, so a handler that fails or panics is logged and skipped
//! without affecting the others or the publisher. Nothing is queued or
//! persisted.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Event, EventType};

/// Unique identifier for a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handler signature. An `Err` is treated as a handler fault.
pub type EventHandlerFn = Arc<dyn Fn(&Event) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    name: String,
    handler: EventHandlerFn,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// In-process publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<Subscription>>>,
    wildcard: RwLock<Vec<Subscription>>,
    published: AtomicU64,
    failures: AtomicU64,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type.
    pub async fn subscribe<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe_named(event_type, format!("{event_type}-handler"), handler)
            .await
    }

    /// Register a handler with a name used in fault logs.
    pub async fn subscribe_named<F>(
        &self,
        event_type: EventType,
        name: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            name: name.into(),
            handler: Arc::new(handler),
        };
        let id = subscription.id;
        self.subscribers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(subscription);
        id
    }

    /// Register a handler that sees every event, after type-specific handlers.
    pub async fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            name: "wildcard-handler".to_string(),
            handler: Arc::new(handler),
        };
        let id = subscription.id;
        self.wildcard.write().await.push(subscription);
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for subs in self.subscribers.write().await.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
        }
        let mut wildcard = self.wildcard.write().await;
        let before = wildcard.len();
        wildcard.retain(|s| s.id != id);
        removed || wildcard.len() != before
    }

    /// Deliver an event to every matching handler before returning.
    pub async fn publish(&self, event: &Event) -> DeliveryReport {
        // Snapshot so handlers run without the lock held.
        let mut targets: Vec<Subscription> = self
            .subscribers
            .read()
            .await
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        targets.extend(self.wildcard.read().await.iter().cloned());

        self.published.fetch_add(1, Ordering::Relaxed);

        let mut report = DeliveryReport::default();
        for subscription in &targets {
            match invoke(subscription, event) {
                Ok(()) => report.delivered += 1,
                Err(fault) => {
                    report.failed += 1;
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        event_type = %event.event_type,
                        error = %fault,
                        "event handler failed"
                    );
                }
            }
        }

        tracing::trace!(
            event_type = %event.event_type,
            source = %event.source,
            delivered = report.delivered,
            failed = report.failed,
            "event published"
        );
        report
    }

    /// Number of handlers registered for an event type (excluding wildcards).
    pub async fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .read()
            .await
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Total events published since construction.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total handler faults since construction.
    pub fn handler_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Run one handler inside its own error boundary.
fn invoke(subscription: &Subscription, event: &Event) -> Result<(), DomainError> {
    let fault = |reason: String| DomainError::HandlerFault {
        handler: subscription.name.clone(),
        reason,
    };

    match catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(fault(reason)),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(fault(format!("panic: {reason}")))
        }
    }
}
