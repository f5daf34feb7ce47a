//! Mark-awaiting-driver step.

use async_trait::async_trait;
use domain::{DeliveryStatus, DeliveryUpdate};
use store::DeliveryStore;

use crate::delivery_lifecycle::{DispatchContext, STEP_MARK_AWAITING_DRIVER};
use crate::error::Result;
use crate::step::{
    CompensationData, StepHandle, StepOutcome, WorkflowStep, require_delivery_id,
};

/// Moves the delivery to `AwaitingDriver` once the restaurant has
/// acknowledged.
///
/// If a claim already won the race and advanced the delivery past this
/// point, the step commits as an already-advanced no-op.
pub struct MarkAwaitingDriverStep<S> {
    store: S,
}

impl<S> MarkAwaitingDriverStep<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> WorkflowStep<DispatchContext> for MarkAwaitingDriverStep<S>
where
    S: DeliveryStore,
{
    fn name(&self) -> &'static str {
        STEP_MARK_AWAITING_DRIVER
    }

    async fn execute(
        &self,
        ctx: &mut DispatchContext,
        _handle: &StepHandle,
    ) -> Result<StepOutcome> {
        let delivery_id = require_delivery_id(ctx.delivery_id, STEP_MARK_AWAITING_DRIVER)?;
        let delivery = self.store.get(delivery_id).await?;

        if delivery.driver_id().is_some() {
            tracing::debug!(%delivery_id, "delivery already claimed, skipping awaiting-driver");
            return Ok(StepOutcome::completed());
        }

        let previous_status = delivery.status();
        self.store
            .update(
                delivery_id,
                DeliveryUpdate::new().with_status(DeliveryStatus::AwaitingDriver),
            )
            .await?;
        tracing::info!(%delivery_id, "delivery awaiting driver");

        Ok(StepOutcome::completed_with(
            CompensationData::StatusChanged {
                delivery_id,
                previous_status,
                previous_driver: delivery.driver_id(),
                previous_eta: delivery.eta(),
            },
        ))
    }

    async fn compensate(&self, _ctx: &DispatchContext, data: &CompensationData) -> Result<()> {
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
