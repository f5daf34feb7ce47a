//! Saga pattern implementation for the delivery lifecycle.
//!
//! This crate provides the orchestration engine that drives a delivery
//! from creation to a terminal state:
//! 1. Create the delivery record
//! 2. Notify the restaurant (asynchronous, resumed by acknowledgment)
//! 3. Move to awaiting-driver
//! 4. Offer the job to drivers (asynchronous, resumed by a claim)
//!
//! Asynchronous steps suspend the workflow and park it in the
//! [`AsyncStepRegistry`] until an external signal or the timeout sweeper
//! resolves them. If any step fails terminally, previously committed
//! steps are compensated in reverse order.

pub mod coordinator;
pub mod delivery_lifecycle;
pub mod error;
pub mod events;
pub mod executor;
pub mod instance;
pub mod registry;
pub mod services;
pub mod state;
pub mod step;
pub mod steps;

pub use coordinator::SagaCoordinator;
pub use delivery_lifecycle::{
    DeliveryWorkflowConfig, DispatchDeliveryInput, UpdateDeliveryInput,
};
pub use error::SagaError;
pub use events::SagaEvent;
pub use instance::{SagaInstance, SagaLog};
pub use registry::{AsyncStepRegistry, StepResolution};
pub use services::{EventBus, InMemoryEventBus, PublishedEvent};
pub use state::SagaState;
pub use step::{CompensationData, RetryPolicy, StepHandle, StepOutcome, WorkflowDefinition, WorkflowStep};
