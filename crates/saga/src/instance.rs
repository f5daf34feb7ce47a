//! Saga execution record and the process-wide execution log.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};
use domain::{DeliveryId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::events::SagaEvent;
use crate::state::SagaState;
use crate::step::CompensationData;

/// A step that completed successfully, with the compensation payload
/// captured at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedStep {
    pub name: String,
    pub compensation: CompensationData,
}

/// The currently parked async step of a suspended saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedStep {
    pub step_name: String,
    pub token: StepId,
    pub deadline: DateTime<Utc>,
}

/// The runtime state of one saga execution.
///
/// Built by applying [`SagaEvent`]s in order; process-lifetime state, not
/// persisted across restarts. Compensation is only ever driven from
/// `committed_steps`, in strict reverse commit order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    workflow_id: Option<WorkflowId>,
    workflow_name: String,
    transaction_id: Option<TransactionId>,
    delivery_id: Option<DeliveryId>,
    state: SagaState,
    current_step: usize,
    committed_steps: Vec<CommittedStep>,
    suspended: Option<SuspendedStep>,
    failure_reason: Option<String>,
    history: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Applies an event, updating the record. Pure and deterministic.
    ///
    /// Terminal instances accept no further mutation; late events are
    /// dropped.
    pub fn apply(&mut self, event: SagaEvent) {
        if self.state.is_terminal() {
            tracing::debug!(
                event = event.event_type(),
                "event for terminal saga instance dropped"
            );
            return;
        }
        match &event {
            SagaEvent::SagaStarted(data) => {
                self.workflow_id = Some(data.workflow_id);
                self.workflow_name = data.workflow_name.clone();
                self.transaction_id = data.transaction_id.clone();
                self.state = SagaState::Running;
            }
            SagaEvent::StepStarted(data) => {
                if data.attempt == 1 {
                    self.current_step += 1;
                }
            }
            SagaEvent::StepSuspended(data) => {
                self.state = SagaState::Suspended;
                self.suspended = Some(SuspendedStep {
                    step_name: data.step_name.clone(),
                    token: data.step_id,
                    deadline: data.deadline,
                });
            }
            SagaEvent::StepResumed(_) => {
                self.state = SagaState::Running;
                self.suspended = None;
            }
            SagaEvent::StepCompleted(data) => {
                // Idempotent single-commit per step name.
                if !self.committed_steps.iter().any(|s| s.name == data.step_name) {
                    self.committed_steps.push(CommittedStep {
                        name: data.step_name.clone(),
                        compensation: data.compensation.clone(),
                    });
                }
                if self.delivery_id.is_none() {
                    self.delivery_id = data.compensation.delivery_id();
                }
            }
            SagaEvent::StepFailed(data) => {
                self.failure_reason = Some(data.error.clone());
                self.suspended = None;
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.committed_steps.retain(|s| s.name != data.step_name);
            }
            SagaEvent::CompensationStepFailed(_) => {
                // Compensation failures are logged but don't stop the chain
            }
            SagaEvent::SagaCompleted(_) => {
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason.clone());
            }
        }
        self.history.push(event);
    }
}

// Query methods
impl SagaInstance {
    /// Returns the workflow instance ID.
    pub fn workflow_id(&self) -> Option<WorkflowId> {
        self.workflow_id
    }

    /// Returns the workflow name.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Returns the originating transaction ID, if known.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.transaction_id.as_ref()
    }

    /// Returns the delivery this saga operates on, once created.
    pub fn delivery_id(&self) -> Option<DeliveryId> {
        self.delivery_id
    }

    /// Returns the saga state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the 1-based index of the step currently in flight.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Returns the committed, not-yet-compensated steps in commit order.
    pub fn committed_steps(&self) -> &[CommittedStep] {
        &self.committed_steps
    }

    /// Returns the committed step names in commit order.
    pub fn committed_step_names(&self) -> Vec<&str> {
        self.committed_steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the parked step while the saga is suspended.
    pub fn suspended(&self) -> Option<&SuspendedStep> {
        self.suspended.as_ref()
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the full event history.
    pub fn history(&self) -> &[SagaEvent] {
        &self.history
    }
}

#[derive(Default)]
struct SagaLogState {
    instances: HashMap<WorkflowId, SagaInstance>,
    by_delivery: HashMap<DeliveryId, WorkflowId>,
}

/// Process-wide log of saga executions.
///
/// `record` appends an event to the instance's history and applies it,
/// so suspension state is visible to concurrent readers (the claim path
/// looks up the parked token here) the moment it is journaled.
#[derive(Clone, Default)]
pub struct SagaLog {
    inner: Arc<RwLock<SagaLogState>>,
}

impl SagaLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event against a workflow instance.
    pub fn record(&self, workflow_id: WorkflowId, event: SagaEvent) {
        let mut state = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the workflow that created the delivery owns the index
        // entry; claim/update workflows touching the same record must
        // not steal it from the parked dispatch saga.
        if let SagaEvent::StepCompleted(data) = &event
            && let CompensationData::CreatedDelivery { delivery_id } = &data.compensation
        {
            state.by_delivery.insert(*delivery_id, workflow_id);
        }
        let instance = state.instances.entry(workflow_id).or_default();
        instance.apply(event);
    }

    /// Returns a snapshot of the instance, if it exists.
    pub fn get(&self, workflow_id: WorkflowId) -> Option<SagaInstance> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .get(&workflow_id)
            .cloned()
    }

    /// Returns the workflow that created the given delivery, if any.
    pub fn workflow_for_delivery(&self, delivery_id: DeliveryId) -> Option<WorkflowId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_delivery
            .get(&delivery_id)
            .copied()
    }

    /// Returns the parked step token of a suspended instance.
    pub fn suspended_token(&self, workflow_id: WorkflowId) -> Option<StepId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .get(&workflow_id)
            .and_then(|i| i.suspended())
            .map(|s| s.token)
    }

    /// Returns the number of tracked instances.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .len()
    }

    /// Returns true if no instances are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
