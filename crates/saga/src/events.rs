//! Saga execution journal events.

use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};
use domain::TransactionId;
use serde::{Deserialize, Serialize};

use crate::step::CompensationData;

/// Events recorded during saga execution.
///
/// Applied in order to a [`SagaInstance`](crate::instance::SagaInstance)
/// they reconstruct its state; the journal is process-lifetime state and
/// doubles as the audit trail exposed by the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A step attempt started (attempt 1 is the first).
    StepStarted(StepAttemptData),

    /// An async step parked itself awaiting resolution.
    StepSuspended(StepSuspendedData),

    /// A suspended step was resolved successfully.
    StepResumed(StepResumedData),

    /// A step committed with its compensation payload.
    StepCompleted(StepCompletedData),

    /// A step failed terminally.
    StepFailed(StepFailedData),

    /// Compensation started after a step failure.
    CompensationStarted(CompensationStartedData),

    /// A compensation step completed successfully.
    CompensationStepCompleted(StepData),

    /// A compensation step failed (logged, compensation continues).
    CompensationStepFailed(StepFailedData),

    /// Saga completed successfully.
    SagaCompleted(SagaCompletedData),

    /// Saga failed after compensation.
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepSuspended(_) => "StepSuspended",
            SagaEvent::StepResumed(_) => "StepResumed",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    /// The workflow instance ID.
    pub workflow_id: WorkflowId,
    /// The workflow name (e.g., "DeliveryDispatch").
    pub workflow_name: String,
    /// The originating order's transaction ID, when known at start.
    pub transaction_id: Option<TransactionId>,
    /// When the saga started.
    pub started_at: DateTime<Utc>,
}

/// Data for step events that only carry the step name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepData {
    /// The step name.
    pub step_name: String,
}

/// Data for StepStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttemptData {
    /// The step name.
    pub step_name: String,
    /// The attempt number, starting at 1.
    pub attempt: u32,
}

/// Data for StepSuspended event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSuspendedData {
    /// The step name.
    pub step_name: String,
    /// Token an external resolver must present.
    pub step_id: StepId,
    /// Instant after which the sweeper fails the step.
    pub deadline: DateTime<Utc>,
}

/// Data for StepResumed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResumedData {
    /// The step name.
    pub step_name: String,
    /// The resolved token.
    pub step_id: StepId,
    /// Payload supplied by the resolver.
    pub payload: serde_json::Value,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    /// The step name.
    pub step_name: String,
    /// Compensation payload captured at commit time.
    pub compensation: CompensationData,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    /// The step that failed.
    pub step_name: String,
    /// Error message describing the failure.
    pub error: String,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationStartedData {
    /// Description of the failure that triggered compensation.
    pub cause: String,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaCompletedData {
    /// When the saga completed.
    pub completed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFailedData {
    /// Reason for failure.
    pub reason: String,
    /// When the saga failed.
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    /// Creates a SagaStarted event.
    pub fn saga_started(
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        transaction_id: Option<TransactionId>,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            workflow_id,
            workflow_name: workflow_name.into(),
            transaction_id,
            started_at: Utc::now(),
        })
    }

    /// Creates a StepStarted event.
    pub fn step_started(step_name: impl Into<String>, attempt: u32) -> Self {
        SagaEvent::StepStarted(StepAttemptData {
            step_name: step_name.into(),
            attempt,
        })
    }

    /// Creates a StepSuspended event.
    pub fn step_suspended(
        step_name: impl Into<String>,
        step_id: StepId,
        deadline: DateTime<Utc>,
    ) -> Self {
        SagaEvent::StepSuspended(StepSuspendedData {
            step_name: step_name.into(),
            step_id,
            deadline,
        })
    }

    /// Creates a StepResumed event.
    pub fn step_resumed(
        step_name: impl Into<String>,
        step_id: StepId,
        payload: serde_json::Value,
    ) -> Self {
        SagaEvent::StepResumed(StepResumedData {
            step_name: step_name.into(),
            step_id,
            payload,
        })
    }

    /// Creates a StepCompleted event.
    pub fn step_completed(step_name: impl Into<String>, compensation: CompensationData) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            compensation,
        })
    }

    /// Creates a StepFailed event.
    pub fn step_failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    /// Creates a CompensationStarted event.
    pub fn compensation_started(cause: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationStartedData {
            cause: cause.into(),
        })
    }

    /// Creates a CompensationStepCompleted event.
    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    /// Creates a CompensationStepFailed event.
    pub fn compensation_step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    /// Creates a SagaCompleted event.
    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    /// Creates a SagaFailed event.
    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
