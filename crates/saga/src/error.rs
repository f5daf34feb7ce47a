//! Saga error types.

use common::StepId;
use domain::{DeliveryError, DeliveryId, DriverId};
use store::StoreError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A referenced entity (delivery, restaurant link, driver) does not
    /// exist. Fatal to the current step.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The losing side of a claim race. Reported to the caller as a
    /// normal rejection, never retried.
    #[error("Delivery {delivery_id} already claimed by driver {driver_id}")]
    AlreadyClaimed {
        delivery_id: DeliveryId,
        driver_id: DriverId,
    },

    /// An async step's deadline elapsed with no resolution.
    #[error("Step '{step}' timed out awaiting resolution")]
    Timeout { step: String },

    /// A step id was registered twice. Correct orchestration never
    /// produces this; it indicates a programming error.
    #[error("Duplicate step id registered: {0}")]
    DuplicateStepId(StepId),

    /// A resolution referenced a step id that is not pending (already
    /// resolved, expired, or never registered). Expected outcome of the
    /// resolve-vs-timeout race.
    #[error("Unknown step id: {0}")]
    UnknownStepId(StepId),

    /// A saga step failed.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A compensation step failed (logged, compensation continues).
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// Saga is in an invalid state for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: SagaState },

    /// The event bus rejected a publish. Retryable.
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// A domain rule rejected a delivery mutation.
    #[error("Delivery error: {0}")]
    Domain(#[from] DeliveryError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No workflow instance exists for the given id.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(common::WorkflowId),
}

impl SagaError {
    /// Returns true if the step executor may retry the failed attempt in
    /// place. Everything else propagates to the orchestrator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SagaError::Notifier(_) | SagaError::Timeout { .. })
    }
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => SagaError::NotFound { entity, id },
            StoreError::Domain(DeliveryError::AlreadyClaimed {
                delivery_id,
                driver_id,
            }) => SagaError::AlreadyClaimed {
                delivery_id,
                driver_id,
            },
            StoreError::Domain(e) => SagaError::Domain(e),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
