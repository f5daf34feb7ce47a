//! Event bus trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::SagaError;

/// An event published on the bus.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// The event name (e.g., `notify.restaurant`).
    pub name: String,
    /// The event payload.
    pub payload: serde_json::Value,
}

/// Trait for publishing notification events.
///
/// Fire-and-forget from the workflow's perspective, but publish failures
/// surface as step failures rather than being swallowed.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an event.
    async fn publish(&self, event_name: &str, payload: serde_json::Value)
    -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    published: Vec<PublishedEvent>,
    fail_on_publish: bool,
}

/// In-memory event bus for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryEventBus {
    /// Creates a new in-memory event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to fail on subsequent publish calls.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns the number of published events.
    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }

    /// Returns all published events with the given name.
    pub fn events_named(&self, name: &str) -> Vec<PublishedEvent> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Returns the most recently published event, if any.
    pub fn last_event(&self) -> Option<PublishedEvent> {
        self.state.read().unwrap().published.last().cloned()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_publish {
            return Err(SagaError::Notifier("event bus unavailable".to_string()));
        }

        tracing::debug!(event = event_name, "event published");
        state.published.push(PublishedEvent {
            name: event_name.to_string(),
            payload,
        });
        Ok(())
    }
}
