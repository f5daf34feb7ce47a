//! Claim-delivery workflow steps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use store::DeliveryStore;

use crate::delivery_lifecycle::{
    ClaimContext, STEP_CLAIM_DELIVERY, STEP_REMOVE_DRIVER_OFFERS, STEP_RESOLVE_PENDING,
};
use crate::error::{Result, SagaError};
use crate::instance::SagaLog;
use crate::registry::AsyncStepRegistry;
use crate::step::{CompensationData, StepHandle, StepOutcome, WorkflowStep};

/// Conditionally claims the delivery for the calling driver.
///
/// Fails with `NotFound` when the delivery or driver does not exist.
/// The underlying store update is a compare-and-set on the delivery's
/// status; the loser of a race observes `AlreadyClaimed` and commits
/// nothing, so the rejection surfaces to the caller untouched.
pub struct ClaimDeliveryStep<S> {
    store: S,
    eta_offset: Duration,
}

impl<S> ClaimDeliveryStep<S> {
    pub fn new(store: S, eta_offset: Duration) -> Self {
        Self { store, eta_offset }
    }
}

#[async_trait]
impl<S> WorkflowStep<ClaimContext> for ClaimDeliveryStep<S>
where
    S: DeliveryStore,
{
    fn name(&self) -> &'static str {
        STEP_CLAIM_DELIVERY
    }

    async fn execute(&self, ctx: &mut ClaimContext, _handle: &StepHandle) -> Result<StepOutcome> {
        let previous = self.store.get(ctx.delivery_id).await?;
        self.store.get_driver(ctx.driver_id).await?;
        let eta = Utc::now()
            + chrono::Duration::from_std(self.eta_offset)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));

        let claimed = self.store.claim(ctx.delivery_id, ctx.driver_id, eta).await?;
        tracing::info!(
            delivery_id = %ctx.delivery_id,
            driver_id = %ctx.driver_id,
            "delivery claimed"
        );
        ctx.claimed = Some(claimed);

        Ok(StepOutcome::completed_with(
            CompensationData::StatusChanged {
                delivery_id: ctx.delivery_id,
                previous_status: previous.status(),
                previous_driver: previous.driver_id(),
                previous_eta: previous.eta(),
            },
        ))
    }

    async fn compensate(&self, _ctx: &ClaimContext, data: &CompensationData) -> Result<()> {
        if let CompensationData::StatusChanged {
            delivery_id,
            previous_status,
            previous_driver,
            previous_eta,
        } = data
        {
            self.store
                .revert_fields(*delivery_id, *previous_status, *previous_driver, *previous_eta)
                .await?;
        }
        Ok(())
    }
}

/// Removes the now-obsolete pending driver offers for the claimed
/// delivery.
pub struct RemoveDriverOffersStep<S> {
    store: S,
}

impl<S> RemoveDriverOffersStep<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> WorkflowStep<ClaimContext> for RemoveDriverOffersStep<S>
where
    S: DeliveryStore,
{
    fn name(&self) -> &'static str {
        STEP_REMOVE_DRIVER_OFFERS
    }

    async fn execute(&self, ctx: &mut ClaimContext, _handle: &StepHandle) -> Result<StepOutcome> {
        let drivers = self.store.driver_offers(ctx.delivery_id).await?;
        self.store.remove_driver_offers(ctx.delivery_id).await?;

        Ok(StepOutcome::completed_with(CompensationData::RemovedOffers {
            delivery_id: ctx.delivery_id,
            drivers,
        }))
    }

    async fn compensate(&self, _ctx: &ClaimContext, data: &CompensationData) -> Result<()> {
        if let CompensationData::RemovedOffers {
            delivery_id,
            drivers,
        } = data
            && !drivers.is_empty()
        {
            self.store
                .record_driver_offers(*delivery_id, drivers.clone())
                .await?;
        }
        Ok(())
    }
}

/// Resolves the dispatch saga's currently parked step as succeeded, so
/// the saga instance advances past awaiting-driver.
///
/// Finding no parked step is not an error: the dispatch saga may already
/// have been resolved by the restaurant acknowledgment path, or may have
/// finished. An already-resolved token (`UnknownStepId`) is the expected
/// race-loser no-op.
pub struct ResolvePendingStep {
    registry: Arc<AsyncStepRegistry>,
    log: SagaLog,
}

impl ResolvePendingStep {
    pub fn new(registry: Arc<AsyncStepRegistry>, log: SagaLog) -> Self {
        Self { registry, log }
    }
}

#[async_trait]
impl WorkflowStep<ClaimContext> for ResolvePendingStep {
    fn name(&self) -> &'static str {
        STEP_RESOLVE_PENDING
    }

    async fn execute(&self, ctx: &mut ClaimContext, _handle: &StepHandle) -> Result<StepOutcome> {
        let Some(workflow_id) = self.log.workflow_for_delivery(ctx.delivery_id) else {
            tracing::debug!(delivery_id = %ctx.delivery_id, "no dispatch saga for delivery");
            return Ok(StepOutcome::completed());
        };
        let Some(token) = self.log.suspended_token(workflow_id) else {
            tracing::debug!(%workflow_id, "dispatch saga has no parked step");
            return Ok(StepOutcome::completed());
        };

        let payload = serde_json::to_value(&ctx.claimed)?;
        match self.registry.resolve_success(token, payload) {
            Ok(()) => {
                tracing::info!(%workflow_id, %token, "parked dispatch step resolved by claim");
            }
            Err(SagaError::UnknownStepId(_)) => {
                tracing::debug!(%token, "parked step already resolved");
            }
            Err(err) => return Err(err),
        }
        Ok(StepOutcome::completed())
    }
}
