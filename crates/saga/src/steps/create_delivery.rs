//! Create-delivery step.

use async_trait::async_trait;
use store::DeliveryStore;

use crate::delivery_lifecycle::{DispatchContext, STEP_CREATE_DELIVERY};
use crate::error::Result;
use crate::step::{CompensationData, StepHandle, StepOutcome, WorkflowStep};

/// Inserts the delivery record in `Created` status.
///
/// This is the only step with a destructive compensation: rolling back
/// tears down any pending driver offers and soft-deletes the record
/// (stamping it `Cancelled`); it is never hard deleted.
pub struct CreateDeliveryStep<S> {
    store: S,
}

impl<S> CreateDeliveryStep<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> WorkflowStep<DispatchContext> for CreateDeliveryStep<S>
where
    S: DeliveryStore,
{
    fn name(&self) -> &'static str {
        STEP_CREATE_DELIVERY
    }

    async fn execute(
        &self,
        ctx: &mut DispatchContext,
        _handle: &StepHandle,
    ) -> Result<StepOutcome> {
        let delivery = self
            .store
            .create(
                ctx.transaction_id.clone(),
                ctx.restaurant_id,
                ctx.items.clone(),
            )
            .await?;
        ctx.delivery_id = Some(delivery.id());
        tracing::info!(
            delivery_id = %delivery.id(),
            transaction_id = %delivery.transaction_id(),
            "delivery created"
        );

        Ok(StepOutcome::completed_with(
            CompensationData::CreatedDelivery {
                delivery_id: delivery.id(),
            },
        ))
    }

    async fn compensate(&self, _ctx: &DispatchContext, data: &CompensationData) -> Result<()> {
        if let CompensationData::CreatedDelivery { delivery_id } = data {
            self.store.remove_driver_offers(*delivery_id).await?;
            self.store.soft_delete(*delivery_id).await?;
            tracing::info!(%delivery_id, "delivery soft-deleted by compensation");
        }
        Ok(())
    }
}
