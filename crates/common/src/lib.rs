//! Shared identifier types used across the delivery platform crates.

pub mod types;

pub use types::{StepId, WorkflowId};
