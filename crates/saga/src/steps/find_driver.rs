//! Find-driver step.

use async_trait::async_trait;
use domain::DriverId;
use store::DeliveryStore;

use crate::delivery_lifecycle::{DispatchContext, EVENT_NOTIFY_DRIVERS, STEP_FIND_DRIVER};
use crate::error::Result;
use crate::services::EventBus;
use crate::step::{
    CompensationData, RetryPolicy, StepHandle, StepOutcome, WorkflowStep, require_delivery_id,
};

/// Offers the delivery to candidate drivers and suspends until one
/// claims it.
///
/// If a driver already claimed the delivery while the restaurant
/// acknowledgment was in flight, the step completes synchronously
/// instead of suspending, so the saga cannot park on a job that is
/// already taken.
pub struct FindDriverStep<S, N> {
    store: S,
    notifier: N,
    policy: RetryPolicy,
}

impl<S, N> FindDriverStep<S, N> {
    pub fn new(store: S, notifier: N, policy: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }
}

#[async_trait]
impl<S, N> WorkflowStep<DispatchContext> for FindDriverStep<S, N>
where
    S: DeliveryStore,
    N: EventBus,
{
    fn name(&self) -> &'static str {
        STEP_FIND_DRIVER
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn execute(
        &self,
        ctx: &mut DispatchContext,
        handle: &StepHandle,
    ) -> Result<StepOutcome> {
        let delivery_id = require_delivery_id(ctx.delivery_id, STEP_FIND_DRIVER)?;
        let delivery = self.store.get(delivery_id).await?;

        if delivery.driver_id().is_some() {
            tracing::debug!(%delivery_id, "delivery already claimed, no driver search needed");
            return Ok(StepOutcome::completed());
        }

        let drivers: Vec<DriverId> = self
            .store
            .list_drivers()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        self.store
            .record_driver_offers(delivery_id, drivers.clone())
            .await?;

        self.notifier
            .publish(
                EVENT_NOTIFY_DRIVERS,
                serde_json::json!({
                    "delivery_id": delivery_id,
                    "step_id": handle.token,
                    "drivers": drivers,
                }),
            )
            .await?;
        tracing::info!(
            %delivery_id,
            candidates = drivers.len(),
            "delivery offered to drivers, awaiting claim"
        );

        Ok(StepOutcome::suspended_with(
            CompensationData::OfferedDrivers {
                delivery_id,
                drivers,
            },
        ))
    }

    async fn compensate(&self, _ctx: &DispatchContext, data: &CompensationData) -> Result<()> {
        if let CompensationData::OfferedDrivers { delivery_id, .. } = data {
            self.store.remove_driver_offers(*delivery_id).await?;
            tracing::info!(%delivery_id, "pending driver offers removed by compensation");
        }
        Ok(())
    }
}
