//! Delivery lifecycle workflow definitions and constants.

use std::sync::Arc;
use std::time::Duration;

use common::StepId;
use domain::{Delivery, DeliveryId, DeliveryUpdate, DriverId, LineItem, RestaurantId, TransactionId};
use store::DeliveryStore;

use crate::instance::SagaLog;
use crate::registry::AsyncStepRegistry;
use crate::services::EventBus;
use crate::step::{RetryPolicy, WorkflowDefinition};
use crate::steps::{
    ClaimDeliveryStep, CreateDeliveryStep, FindDriverStep, MarkAwaitingDriverStep,
    NotifyRestaurantStep, RemoveDriverOffersStep, ResolveDirectivesStep, ResolvePendingStep,
    UpdateDeliveryStep,
};

/// The workflow name for delivery dispatch.
pub const DISPATCH_WORKFLOW: &str = "DeliveryDispatch";

/// The workflow name for a driver claiming a delivery.
pub const CLAIM_WORKFLOW: &str = "DeliveryClaim";

/// The workflow name for a generic delivery update.
pub const UPDATE_WORKFLOW: &str = "DeliveryUpdate";

/// Step name: insert the delivery record.
pub const STEP_CREATE_DELIVERY: &str = "create_delivery";

/// Step name: notify the restaurant and await acknowledgment.
pub const STEP_NOTIFY_RESTAURANT: &str = "notify_restaurant";

/// Step name: move the delivery to awaiting-driver.
pub const STEP_MARK_AWAITING_DRIVER: &str = "mark_awaiting_driver";

/// Step name: offer the job to drivers and await a claim.
pub const STEP_FIND_DRIVER: &str = "find_driver";

/// Step name: conditional claim update.
pub const STEP_CLAIM_DELIVERY: &str = "claim_delivery";

/// Step name: tear down pending driver offers.
pub const STEP_REMOVE_DRIVER_OFFERS: &str = "remove_driver_offers";

/// Step name: resolve the dispatch saga's parked step.
pub const STEP_RESOLVE_PENDING: &str = "resolve_pending_step";

/// Step name: generic delivery field update.
pub const STEP_UPDATE_DELIVERY: &str = "update_delivery";

/// Event published to tell a restaurant to prepare an order.
pub const EVENT_NOTIFY_RESTAURANT: &str = "notify.restaurant";

/// Event published to offer a delivery to candidate drivers.
pub const EVENT_NOTIFY_DRIVERS: &str = "notify.drivers";

/// Fixed per-step timing configuration for the delivery workflows.
///
/// Defaults carry the production values; tests shrink them to drive the
/// timeout paths quickly.
#[derive(Debug, Clone)]
pub struct DeliveryWorkflowConfig {
    /// Deadline for the restaurant acknowledgment.
    pub notify_restaurant_timeout: Duration,
    /// Retry budget for the restaurant notification.
    pub notify_restaurant_retries: u32,
    /// Deadline for a driver claim.
    pub find_driver_timeout: Duration,
    /// Pause between step attempts.
    pub retry_backoff: Duration,
    /// ETA offset stamped on a successful claim.
    pub claim_eta: Duration,
    /// Cadence of the registry timeout sweep.
    pub sweep_interval: Duration,
}

impl Default for DeliveryWorkflowConfig {
    fn default() -> Self {
        Self {
            notify_restaurant_timeout: Duration::from_secs(60 * 15),
            notify_restaurant_retries: 2,
            find_driver_timeout: Duration::from_secs(60 * 30),
            retry_backoff: Duration::from_secs(10),
            claim_eta: Duration::from_secs(60 * 30),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl DeliveryWorkflowConfig {
    /// Policy for the restaurant notification step.
    pub fn notify_restaurant_policy(&self) -> RetryPolicy {
        RetryPolicy::retries(self.notify_restaurant_retries, self.retry_backoff)
            .with_timeout(self.notify_restaurant_timeout)
    }

    /// Policy for the find-driver step.
    pub fn find_driver_policy(&self) -> RetryPolicy {
        RetryPolicy::none().with_timeout(self.find_driver_timeout)
    }
}

/// Input to start a delivery dispatch saga. All fields are required.
#[derive(Debug, Clone)]
pub struct DispatchDeliveryInput {
    pub transaction_id: TransactionId,
    pub restaurant_id: RestaurantId,
    pub items: Vec<LineItem>,
}

impl DispatchDeliveryInput {
    /// Creates a dispatch input.
    pub fn new(
        transaction_id: TransactionId,
        restaurant_id: RestaurantId,
        items: Vec<LineItem>,
    ) -> Self {
        Self {
            transaction_id,
            restaurant_id,
            items,
        }
    }
}

/// Input for the update-delivery workflow.
///
/// The optional directives let one call both update the record and
/// resolve a suspended step elsewhere, bridging the record update and
/// the saga-resumption signal.
#[derive(Debug, Clone)]
pub struct UpdateDeliveryInput {
    pub delivery_id: DeliveryId,
    pub update: DeliveryUpdate,
    pub resolve_success: Option<StepId>,
    pub resolve_failure: Option<StepId>,
}

impl UpdateDeliveryInput {
    /// Creates an update input with no step directives.
    pub fn new(delivery_id: DeliveryId, update: DeliveryUpdate) -> Self {
        Self {
            delivery_id,
            update,
            resolve_success: None,
            resolve_failure: None,
        }
    }

    /// Marks the given suspended step succeeded after the update commits.
    pub fn with_resolve_success(mut self, step_id: StepId) -> Self {
        self.resolve_success = Some(step_id);
        self
    }

    /// Marks the given suspended step failed after the update commits.
    pub fn with_resolve_failure(mut self, step_id: StepId) -> Self {
        self.resolve_failure = Some(step_id);
        self
    }
}

/// Execution context for the dispatch workflow.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub transaction_id: TransactionId,
    pub restaurant_id: RestaurantId,
    pub items: Vec<LineItem>,
    pub delivery_id: Option<DeliveryId>,
}

impl DispatchContext {
    /// Builds the context from validated input.
    pub fn new(input: DispatchDeliveryInput) -> Self {
        Self {
            transaction_id: input.transaction_id,
            restaurant_id: input.restaurant_id,
            items: input.items,
            delivery_id: None,
        }
    }
}

/// Execution context for the claim workflow.
#[derive(Debug, Clone)]
pub struct ClaimContext {
    pub delivery_id: DeliveryId,
    pub driver_id: DriverId,
    pub claimed: Option<Delivery>,
}

impl ClaimContext {
    /// Builds the context for one claim attempt.
    pub fn new(delivery_id: DeliveryId, driver_id: DriverId) -> Self {
        Self {
            delivery_id,
            driver_id,
            claimed: None,
        }
    }
}

/// Execution context for the update workflow.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub delivery_id: DeliveryId,
    pub update: DeliveryUpdate,
    pub resolve_success: Option<StepId>,
    pub resolve_failure: Option<StepId>,
    pub updated: Option<Delivery>,
}

impl UpdateContext {
    /// Builds the context from validated input.
    pub fn new(input: UpdateDeliveryInput) -> Self {
        Self {
            delivery_id: input.delivery_id,
            update: input.update,
            resolve_success: input.resolve_success,
            resolve_failure: input.resolve_failure,
            updated: None,
        }
    }
}

/// Builds the dispatch workflow definition:
/// create → notify restaurant (async) → awaiting driver → find driver (async).
pub fn dispatch_definition<S, N>(
    store: S,
    notifier: N,
    config: &DeliveryWorkflowConfig,
) -> WorkflowDefinition<DispatchContext>
where
    S: DeliveryStore + Clone + 'static,
    N: EventBus + Clone + 'static,
{
    WorkflowDefinition::new(DISPATCH_WORKFLOW)
        .step(CreateDeliveryStep::new(store.clone()))
        .step(NotifyRestaurantStep::new(
            store.clone(),
            notifier.clone(),
            config.notify_restaurant_policy(),
        ))
        .step(MarkAwaitingDriverStep::new(store.clone()))
        .step(FindDriverStep::new(
            store,
            notifier,
            config.find_driver_policy(),
        ))
}

/// Builds the claim workflow definition:
/// conditional claim → remove offers → resolve the parked dispatch step.
pub fn claim_definition<S>(
    store: S,
    registry: Arc<AsyncStepRegistry>,
    log: SagaLog,
    config: &DeliveryWorkflowConfig,
) -> WorkflowDefinition<ClaimContext>
where
    S: DeliveryStore + Clone + 'static,
{
    WorkflowDefinition::new(CLAIM_WORKFLOW)
        .step(ClaimDeliveryStep::new(store.clone(), config.claim_eta))
        .step(RemoveDriverOffersStep::new(store))
        .step(ResolvePendingStep::new(registry, log))
}

/// Builds the update workflow definition:
/// validated update → resolve any step directives.
pub fn update_definition<S>(
    store: S,
    registry: Arc<AsyncStepRegistry>,
) -> WorkflowDefinition<UpdateContext>
where
    S: DeliveryStore + Clone + 'static,
{
    WorkflowDefinition::new(UPDATE_WORKFLOW)
        .step(UpdateDeliveryStep::new(store))
        .step(ResolveDirectivesStep::new(registry))
}
