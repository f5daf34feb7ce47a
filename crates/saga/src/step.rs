//! Step contract for workflow definitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};
use domain::{DeliveryId, DeliveryStatus, DriverId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// Default deadline for an async step whose policy does not set one.
pub const DEFAULT_ASYNC_TIMEOUT: Duration = Duration::from_secs(60 * 15);

/// Compensation payload captured when a step commits.
///
/// Each variant carries exactly the data its compensating action needs;
/// the orchestrator stores it verbatim in the execution record and hands
/// it back unchanged during the reverse walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompensationData {
    /// The step has nothing to undo.
    None,

    /// A delivery record was inserted; compensation soft-deletes it.
    CreatedDelivery { delivery_id: DeliveryId },

    /// The restaurant was notified; compensation is a declared non-fatal
    /// outcome (logged, never undone over the wire).
    NotifiedRestaurant { delivery_id: DeliveryId },

    /// Delivery fields were changed; compensation restores the captured
    /// previous values.
    StatusChanged {
        delivery_id: DeliveryId,
        previous_status: DeliveryStatus,
        previous_driver: Option<DriverId>,
        previous_eta: Option<DateTime<Utc>>,
    },

    /// Driver offers were recorded; compensation removes them.
    OfferedDrivers {
        delivery_id: DeliveryId,
        drivers: Vec<DriverId>,
    },

    /// Driver offers were removed; compensation restores them.
    RemovedOffers {
        delivery_id: DeliveryId,
        drivers: Vec<DriverId>,
    },
}

impl CompensationData {
    /// Returns the delivery this payload refers to, if any.
    pub fn delivery_id(&self) -> Option<DeliveryId> {
        match self {
            CompensationData::None => None,
            CompensationData::CreatedDelivery { delivery_id }
            | CompensationData::NotifiedRestaurant { delivery_id }
            | CompensationData::StatusChanged { delivery_id, .. }
            | CompensationData::OfferedDrivers { delivery_id, .. }
            | CompensationData::RemovedOffers { delivery_id, .. } => Some(*delivery_id),
        }
    }
}

/// The result of a step's forward action.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step finished synchronously and is committed with the given
    /// compensation payload.
    Completed { compensation: CompensationData },

    /// The step parked itself awaiting an external signal. The executor
    /// registers the step token and commits the payload only once the
    /// resolution arrives as a success.
    Suspended { compensation: CompensationData },
}

impl StepOutcome {
    /// A completed step with nothing to compensate.
    pub fn completed() -> Self {
        StepOutcome::Completed {
            compensation: CompensationData::None,
        }
    }

    /// A completed step with a compensation payload.
    pub fn completed_with(compensation: CompensationData) -> Self {
        StepOutcome::Completed { compensation }
    }

    /// A suspended step with a compensation payload to commit on
    /// successful resolution.
    pub fn suspended_with(compensation: CompensationData) -> Self {
        StepOutcome::Suspended { compensation }
    }
}

/// Per-step retry and timeout configuration.
///
/// The budget is fixed per step: retryable failures and async timeouts
/// are retried with `backoff` between attempts, up to `max_retries`
/// further attempts, before the failure is reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Deadline for an async resolution; `None` falls back to
    /// [`DEFAULT_ASYNC_TIMEOUT`].
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// A single attempt, no timeout override.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            timeout: None,
        }
    }

    /// Retries with the given budget and backoff.
    pub fn retries(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            timeout: None,
        }
    }

    /// Sets the async resolution deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Identity of one execution attempt of a step.
///
/// The token is minted fresh for every attempt; an async step embeds it
/// in whatever signal it publishes so the external resolver can present
/// it back.
#[derive(Debug, Clone, Copy)]
pub struct StepHandle {
    pub workflow_id: WorkflowId,
    pub token: StepId,
    pub attempt: u32,
}

/// A single named unit of work with a forward action and an optional
/// compensating action.
#[async_trait]
pub trait WorkflowStep<C: Sync>: Send + Sync {
    /// The step name, unique within a workflow definition.
    fn name(&self) -> &'static str;

    /// The fixed retry/timeout configuration for this step.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Runs the forward action.
    async fn execute(&self, ctx: &mut C, handle: &StepHandle) -> Result<StepOutcome>;

    /// Semantically undoes a previously committed execution. The default
    /// has nothing to undo.
    async fn compensate(&self, ctx: &C, data: &CompensationData) -> Result<()> {
        let _ = (ctx, data);
        Ok(())
    }
}

/// An ordered sequence of steps making up one workflow.
pub struct WorkflowDefinition<C: Sync> {
    name: &'static str,
    steps: Vec<Arc<dyn WorkflowStep<C>>>,
}

impl<C: Sync> WorkflowDefinition<C> {
    /// Creates an empty definition with the given workflow name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: impl WorkflowStep<C> + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Returns the workflow name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the steps in declared order.
    pub fn steps(&self) -> &[Arc<dyn WorkflowStep<C>>] {
        &self.steps
    }

    /// Looks up a step by name for the compensation walk.
    pub fn find(&self, name: &str) -> Option<&Arc<dyn WorkflowStep<C>>> {
        self.steps.iter().find(|s| s.name() == name)
    }
}

/// Validation helper shared by steps that require the delivery to have
/// been created earlier in the workflow.
pub fn require_delivery_id(delivery_id: Option<DeliveryId>, step: &'static str) -> Result<DeliveryId> {
    delivery_id.ok_or(SagaError::StepFailed {
        step: step.to_string(),
        reason: "no delivery created earlier in this workflow".to_string(),
    })
}
