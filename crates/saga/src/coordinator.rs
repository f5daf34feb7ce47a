//! Saga coordinator for orchestrating the delivery workflows.

use std::sync::{Arc, Mutex, PoisonError};

use common::WorkflowId;
use domain::{Delivery, DeliveryId, DriverId};
use store::DeliveryStore;
use tokio::task::JoinHandle;

use crate::delivery_lifecycle::{
    self, CLAIM_WORKFLOW, ClaimContext, DISPATCH_WORKFLOW, DeliveryWorkflowConfig,
    DispatchContext, DispatchDeliveryInput, UPDATE_WORKFLOW, UpdateContext, UpdateDeliveryInput,
};
use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::executor::StepExecutor;
use crate::instance::{SagaInstance, SagaLog};
use crate::registry::AsyncStepRegistry;
use crate::services::EventBus;
use crate::step::WorkflowDefinition;

/// Orchestrates the execution of delivery workflows.
///
/// The coordinator drives the dispatch saga (create → notify restaurant →
/// awaiting driver → find driver) with compensating transactions on
/// failure, and runs the claim and update workflows through the same
/// step machinery. Suspended async steps are parked in the injected
/// [`AsyncStepRegistry`], whose timeout sweep the coordinator owns for
/// its lifetime.
pub struct SagaCoordinator<S, N>
where
    S: DeliveryStore + Clone + 'static,
    N: EventBus + Clone + 'static,
{
    store: S,
    notifier: N,
    registry: Arc<AsyncStepRegistry>,
    executor: StepExecutor,
    log: SagaLog,
    config: DeliveryWorkflowConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<S, N> SagaCoordinator<S, N>
where
    S: DeliveryStore + Clone + 'static,
    N: EventBus + Clone + 'static,
{
    /// Creates a coordinator with production timing defaults.
    ///
    /// Must be called within a Tokio runtime; the registry's timeout
    /// sweep is spawned here.
    pub fn new(store: S, notifier: N) -> Self {
        Self::with_config(store, notifier, DeliveryWorkflowConfig::default())
    }

    /// Creates a coordinator with explicit timing configuration.
    pub fn with_config(store: S, notifier: N, config: DeliveryWorkflowConfig) -> Self {
        let registry = Arc::new(AsyncStepRegistry::new());
        let sweeper = Arc::clone(&registry).spawn_sweeper(config.sweep_interval);
        Self {
            store,
            notifier,
            executor: StepExecutor::new(Arc::clone(&registry)),
            registry,
            log: SagaLog::new(),
            config,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Returns a handle to the async step registry.
    pub fn registry(&self) -> Arc<AsyncStepRegistry> {
        Arc::clone(&self.registry)
    }

    /// Starts the dispatch saga for an order and returns the workflow
    /// instance ID immediately; the saga continues asynchronously.
    #[tracing::instrument(skip(self, input), fields(saga_type = DISPATCH_WORKFLOW))]
    pub async fn start_delivery(
        self: Arc<Self>,
        input: DispatchDeliveryInput,
    ) -> Result<WorkflowId> {
        metrics::counter!("saga_executions_total").increment(1);
        let workflow_id = WorkflowId::new();
        self.log.record(
            workflow_id,
            SagaEvent::saga_started(
                workflow_id,
                DISPATCH_WORKFLOW,
                Some(input.transaction_id.clone()),
            ),
        );

        let coordinator = self;
        tokio::spawn(async move {
            let definition = delivery_lifecycle::dispatch_definition(
                coordinator.store.clone(),
                coordinator.notifier.clone(),
                &coordinator.config,
            );
            let mut ctx = DispatchContext::new(input);
            // The terminal outcome is journaled; nothing to return.
            let _ = coordinator
                .run_workflow(workflow_id, &definition, &mut ctx)
                .await;
        });

        Ok(workflow_id)
    }

    /// Claims a delivery for a driver, synchronously from the caller's
    /// perspective.
    ///
    /// Exactly one of several racing claims wins; losers receive
    /// [`SagaError::AlreadyClaimed`] and no record is mutated. A winning
    /// claim also resolves the dispatch saga's parked step so the
    /// suspended instance advances.
    #[tracing::instrument(skip(self), fields(saga_type = CLAIM_WORKFLOW))]
    pub async fn claim_delivery(
        &self,
        delivery_id: DeliveryId,
        driver_id: DriverId,
    ) -> Result<Delivery> {
        metrics::counter!("saga_executions_total").increment(1);
        let workflow_id = WorkflowId::new();
        self.log.record(
            workflow_id,
            SagaEvent::saga_started(workflow_id, CLAIM_WORKFLOW, None),
        );

        let definition = delivery_lifecycle::claim_definition(
            self.store.clone(),
            Arc::clone(&self.registry),
            self.log.clone(),
            &self.config,
        );
        let mut ctx = ClaimContext::new(delivery_id, driver_id);

        match self.run_steps(workflow_id, &definition, &mut ctx).await {
            Ok(()) => {
                self.log.record(workflow_id, SagaEvent::saga_completed());
                metrics::counter!("saga_completed").increment(1);
                ctx.claimed.ok_or_else(|| SagaError::StepFailed {
                    step: delivery_lifecycle::STEP_CLAIM_DELIVERY.to_string(),
                    reason: "claim committed without a result".to_string(),
                })
            }
            Err(err @ SagaError::AlreadyClaimed { .. }) => {
                // Expected rejection for the race loser: the conditional
                // update committed nothing, so there is no cascade to run.
                self.log
                    .record(workflow_id, SagaEvent::saga_failed(err.to_string()));
                metrics::counter!("claim_conflicts_total").increment(1);
                Err(err)
            }
            Err(err) => {
                self.compensate(workflow_id, &definition, &ctx, &err).await;
                Err(err)
            }
        }
    }

    /// Applies a delivery update, optionally resolving suspended step
    /// directives after the record update commits.
    #[tracing::instrument(skip(self, input), fields(saga_type = UPDATE_WORKFLOW))]
    pub async fn update_delivery(&self, input: UpdateDeliveryInput) -> Result<Delivery> {
        metrics::counter!("saga_executions_total").increment(1);
        let workflow_id = WorkflowId::new();
        self.log.record(
            workflow_id,
            SagaEvent::saga_started(workflow_id, UPDATE_WORKFLOW, None),
        );

        let definition = delivery_lifecycle::update_definition(
            self.store.clone(),
            Arc::clone(&self.registry),
        );
        let mut ctx = UpdateContext::new(input);

        self.run_workflow(workflow_id, &definition, &mut ctx).await?;
        ctx.updated.ok_or_else(|| SagaError::StepFailed {
            step: delivery_lifecycle::STEP_UPDATE_DELIVERY.to_string(),
            reason: "update committed without a result".to_string(),
        })
    }

    /// Returns a snapshot of a workflow instance.
    pub fn get_saga(&self, workflow_id: WorkflowId) -> Option<SagaInstance> {
        self.log.get(workflow_id)
    }

    /// Returns the dispatch workflow owning the given delivery.
    pub fn workflow_for_delivery(&self, delivery_id: DeliveryId) -> Option<WorkflowId> {
        self.log.workflow_for_delivery(delivery_id)
    }

    /// Stops the timeout sweep and fails all parked steps so no workflow
    /// task stays suspended past shutdown.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let drained = self.registry.drain();
        if drained > 0 {
            tracing::info!(drained, "drained pending async steps at shutdown");
        }
    }

    /// Runs all steps and journals the terminal outcome, compensating on
    /// failure.
    async fn run_workflow<C: Send + Sync>(
        &self,
        workflow_id: WorkflowId,
        definition: &WorkflowDefinition<C>,
        ctx: &mut C,
    ) -> Result<()> {
        let saga_start = std::time::Instant::now();
        let outcome = self.run_steps(workflow_id, definition, ctx).await;
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                self.log.record(workflow_id, SagaEvent::saga_completed());
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(%workflow_id, workflow = definition.name(), "saga completed");
                Ok(())
            }
            Err(err) => {
                self.compensate(workflow_id, definition, ctx, &err).await;
                Err(err)
            }
        }
    }

    /// Executes steps strictly in declared order.
    async fn run_steps<C: Send + Sync>(
        &self,
        workflow_id: WorkflowId,
        definition: &WorkflowDefinition<C>,
        ctx: &mut C,
    ) -> Result<()> {
        for step in definition.steps() {
            self.executor
                .run_step(workflow_id, step.as_ref(), ctx, &self.log)
                .await?;
        }
        Ok(())
    }

    /// Runs compensating actions for all committed steps in reverse
    /// commit order. Compensation failures are journaled and logged but
    /// do not halt the cascade.
    async fn compensate<C: Send + Sync>(
        &self,
        workflow_id: WorkflowId,
        definition: &WorkflowDefinition<C>,
        ctx: &C,
        cause: &SagaError,
    ) {
        self.log.record(
            workflow_id,
            SagaEvent::compensation_started(cause.to_string()),
        );

        let committed = self
            .log
            .get(workflow_id)
            .map(|instance| instance.committed_steps().to_vec())
            .unwrap_or_default();

        for committed_step in committed.iter().rev() {
            let Some(step) = definition.find(&committed_step.name) else {
                tracing::error!(
                    step = %committed_step.name,
                    "committed step missing from definition, skipping compensation"
                );
                continue;
            };
            match step.compensate(ctx, &committed_step.compensation).await {
                Ok(()) => {
                    self.log.record(
                        workflow_id,
                        SagaEvent::compensation_step_completed(&committed_step.name),
                    );
                }
                Err(err) => {
                    self.log.record(
                        workflow_id,
                        SagaEvent::compensation_step_failed(&committed_step.name, err.to_string()),
                    );
                    metrics::counter!("compensation_failures_total").increment(1);
                    tracing::error!(
                        %workflow_id,
                        step = %committed_step.name,
                        error = %err,
                        "compensation step failed, continuing cascade"
                    );
                }
            }
        }

        self.log
            .record(workflow_id, SagaEvent::saga_failed(cause.to_string()));
        metrics::counter!("saga_failed").increment(1);
        tracing::warn!(%workflow_id, cause = %cause, "saga failed and compensated");
    }
}

impl<S, N> Drop for SagaCoordinator<S, N>
where
    S: DeliveryStore + Clone + 'static,
    N: EventBus + Clone + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
