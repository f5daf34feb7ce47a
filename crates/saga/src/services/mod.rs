//! External service traits and in-memory implementations for saga steps.

pub mod notifier;

pub use notifier::{EventBus, InMemoryEventBus, PublishedEvent};
