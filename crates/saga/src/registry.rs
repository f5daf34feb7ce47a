//! Registry of suspended asynchronous steps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};

/// The outcome delivered to a parked step.
#[derive(Debug)]
pub enum StepResolution {
    /// External success signal with a caller-supplied payload.
    Success { payload: serde_json::Value },
    /// External failure signal.
    Failure { reason: String },
    /// The deadline elapsed before any external signal arrived.
    TimedOut,
}

struct PendingStep {
    workflow_id: WorkflowId,
    step_name: String,
    deadline: DateTime<Utc>,
    sender: oneshot::Sender<StepResolution>,
}

/// Table of in-flight suspended steps, keyed by step token.
///
/// An entry is exclusively owned by the registry from `register` until
/// its first resolution (success, failure, or expiry), at which point it
/// is removed. Removal and delivery happen under one lock acquisition,
/// so exactly one of a racing external resolution and the timeout sweep
/// wins; the loser observes [`SagaError::UnknownStepId`].
///
/// The registry is an injected component with an explicit lifecycle:
/// created alongside the coordinator, swept by a background task, and
/// drained at shutdown.
#[derive(Default)]
pub struct AsyncStepRegistry {
    pending: Mutex<HashMap<StepId, PendingStep>>,
}

impl AsyncStepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StepId, PendingStep>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a suspended step and returns the receiver its workflow
    /// task awaits.
    pub fn register(
        &self,
        step_id: StepId,
        workflow_id: WorkflowId,
        step_name: impl Into<String>,
        deadline: DateTime<Utc>,
    ) -> Result<oneshot::Receiver<StepResolution>> {
        let mut pending = self.lock();
        if pending.contains_key(&step_id) {
            return Err(SagaError::DuplicateStepId(step_id));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(
            step_id,
            PendingStep {
                workflow_id,
                step_name: step_name.into(),
                deadline,
                sender,
            },
        );
        metrics::counter!("async_steps_registered_total").increment(1);
        metrics::gauge!("async_steps_pending").set(pending.len() as f64);
        Ok(receiver)
    }

    /// Resolves a suspended step as succeeded.
    pub fn resolve_success(&self, step_id: StepId, payload: serde_json::Value) -> Result<()> {
        self.resolve(step_id, StepResolution::Success { payload })
    }

    /// Resolves a suspended step as failed, triggering the owning saga's
    /// compensation cascade.
    pub fn resolve_failure(&self, step_id: StepId, reason: impl Into<String>) -> Result<()> {
        self.resolve(
            step_id,
            StepResolution::Failure {
                reason: reason.into(),
            },
        )
    }

    fn resolve(&self, step_id: StepId, resolution: StepResolution) -> Result<()> {
        let entry = {
            let mut pending = self.lock();
            let entry = pending
                .remove(&step_id)
                .ok_or(SagaError::UnknownStepId(step_id))?;
            metrics::gauge!("async_steps_pending").set(pending.len() as f64);
            entry
        };
        tracing::debug!(
            %step_id,
            workflow_id = %entry.workflow_id,
            step = %entry.step_name,
            "resolving suspended step"
        );
        // The workflow task may have been aborted; nothing left to wake.
        if entry.sender.send(resolution).is_err() {
            tracing::debug!(%step_id, "suspended step receiver already gone");
        }
        Ok(())
    }

    /// Fails every entry whose deadline has passed. Returns the number of
    /// expired steps.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> usize {
        let overdue: Vec<StepId> = {
            let pending = self.lock();
            pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(id, _)| *id)
                .collect()
        };

        let mut expired = 0;
        for step_id in overdue {
            // An external resolution may win between the scan and here;
            // UnknownStepId is that race lost, not an error.
            match self.resolve(step_id, StepResolution::TimedOut) {
                Ok(()) => expired += 1,
                Err(SagaError::UnknownStepId(_)) => {}
                Err(err) => {
                    tracing::error!(%step_id, error = %err, "failed to expire step");
                }
            }
        }
        if expired > 0 {
            metrics::counter!("async_steps_expired_total").increment(expired as u64);
        }
        expired
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the given token is pending.
    pub fn is_pending(&self, step_id: StepId) -> bool {
        self.lock().contains_key(&step_id)
    }

    /// Fails all pending entries. Called at shutdown so no workflow task
    /// stays parked forever. Returns the number of drained steps.
    pub fn drain(&self) -> usize {
        let all: Vec<StepId> = self.lock().keys().copied().collect();
        let mut drained = 0;
        for step_id in all {
            if self
                .resolve(
                    step_id,
                    StepResolution::Failure {
                        reason: "registry drained at shutdown".to_string(),
                    },
                )
                .is_ok()
            {
                drained += 1;
            }
        }
        drained
    }

    /// Spawns the background sweep that expires overdue entries every
    /// `interval`. The caller owns the handle and aborts it at shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = registry.expire_overdue(Utc::now());
                if expired > 0 {
                    tracing::info!(expired, "expired overdue async steps");
                }
            }
        })
    }
}
