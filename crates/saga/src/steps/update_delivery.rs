//! Update-delivery workflow steps.

use std::sync::Arc;

use async_trait::async_trait;
use store::DeliveryStore;

use crate::delivery_lifecycle::{STEP_RESOLVE_PENDING, STEP_UPDATE_DELIVERY, UpdateContext};
use crate::error::{Result, SagaError};
use crate::registry::AsyncStepRegistry;
use crate::step::{CompensationData, StepHandle, StepOutcome, WorkflowStep};

/// Applies a validated status/field transition to the delivery.
///
/// Used by the later lifecycle stages (picked up, delivered) and by the
/// restaurant acknowledgment path. Compensation restores the captured
/// previous field values.
pub struct UpdateDeliveryStep<S> {
    store: S,
}

impl<S> UpdateDeliveryStep<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> WorkflowStep<UpdateContext> for UpdateDeliveryStep<S>
where
    S: DeliveryStore,
{
    fn name(&self) -> &'static str {
        STEP_UPDATE_DELIVERY
    }

    async fn execute(&self, ctx: &mut UpdateContext, _handle: &StepHandle) -> Result<StepOutcome> {
        let previous = self.store.get(ctx.delivery_id).await?;
        let updated = self.store.update(ctx.delivery_id, ctx.update.clone()).await?;
        tracing::info!(
            delivery_id = %ctx.delivery_id,
            status = %updated.status(),
            "delivery updated"
        );
        ctx.updated = Some(updated);

        Ok(StepOutcome::completed_with(
            CompensationData::StatusChanged {
                delivery_id: ctx.delivery_id,
                previous_status: previous.status(),
                previous_driver: previous.driver_id(),
                previous_eta: previous.eta(),
            },
        ))
    }

    async fn compensate(&self, _ctx: &UpdateContext, data: &CompensationData) -> Result<()> {
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

/// Resolves the caller-supplied step directives after the record update
/// commits, splicing the delivery update and the saga-resumption signal
/// into one operation from the caller's perspective.
///
/// A directive naming a settled token is an idempotent no-op.
pub struct ResolveDirectivesStep {
    registry: Arc<AsyncStepRegistry>,
}

impl ResolveDirectivesStep {
    pub fn new(registry: Arc<AsyncStepRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkflowStep<UpdateContext> for ResolveDirectivesStep {
    fn name(&self) -> &'static str {
        STEP_RESOLVE_PENDING
    }

    async fn execute(&self, ctx: &mut UpdateContext, _handle: &StepHandle) -> Result<StepOutcome> {
        if let Some(token) = ctx.resolve_success {
            let payload = serde_json::to_value(&ctx.updated)?;
            match self.registry.resolve_success(token, payload) {
                Ok(()) => tracing::info!(%token, "suspended step marked succeeded"),
                Err(SagaError::UnknownStepId(_)) => {
                    tracing::debug!(%token, "success directive for settled step ignored");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(token) = ctx.resolve_failure {
            match self
                .registry
                .resolve_failure(token, "failed by delivery update")
            {
                Ok(()) => tracing::info!(%token, "suspended step marked failed"),
                Err(SagaError::UnknownStepId(_)) => {
                    tracing::debug!(%token, "failure directive for settled step ignored");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(StepOutcome::completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{StepId, WorkflowId};
    use domain::{DeliveryStatus, DeliveryUpdate, DriverId, Restaurant, TransactionId};
    use store::InMemoryDeliveryStore;

    use crate::delivery_lifecycle::UpdateDeliveryInput;
    use crate::registry::StepResolution;

    fn handle() -> StepHandle {
        StepHandle {
            workflow_id: WorkflowId::new(),
            token: StepId::new(),
            attempt: 1,
        }
    }

    async fn claimed_delivery(store: &InMemoryDeliveryStore) -> domain::DeliveryId {
        let restaurant = store
            .insert_restaurant(Restaurant::new("Luigi's", "12 Via Roma"))
            .await
            .unwrap();
        let delivery = store
            .create(TransactionId::new("T1"), restaurant.id, vec![])
            .await
            .unwrap();
        store
            .claim(delivery.id(), DriverId::new(), Utc::now())
            .await
            .unwrap();
        delivery.id()
    }

    #[tokio::test]
    async fn test_update_applies_and_captures_previous() {
        let store = InMemoryDeliveryStore::new();
        let step = UpdateDeliveryStep::new(store.clone());
        let delivery_id = claimed_delivery(&store).await;

        let mut ctx = UpdateContext::new(UpdateDeliveryInput::new(
            delivery_id,
            DeliveryUpdate::new().with_status(DeliveryStatus::InTransit),
        ));
        let outcome = step.execute(&mut ctx, &handle()).await.unwrap();

        assert_eq!(
            ctx.updated.as_ref().map(|d| d.status()),
            Some(DeliveryStatus::InTransit)
        );
        let StepOutcome::Completed { compensation } = outcome else {
            panic!("expected completed outcome");
        };
        assert!(matches!(
            compensation,
            CompensationData::StatusChanged {
                previous_status: DeliveryStatus::PickupClaimed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_rejects_illegal_transition() {
        let store = InMemoryDeliveryStore::new();
        let step = UpdateDeliveryStep::new(store.clone());
        let delivery_id = claimed_delivery(&store).await;

        let mut ctx = UpdateContext::new(UpdateDeliveryInput::new(
            delivery_id,
            DeliveryUpdate::new().with_status(DeliveryStatus::Delivered),
        ));
        let err = step.execute(&mut ctx, &handle()).await.unwrap_err();
        assert!(matches!(err, SagaError::Domain(_)));
    }

    #[tokio::test]
    async fn test_directives_resolve_success_and_failure() {
        let store = InMemoryDeliveryStore::new();
        let registry = Arc::new(AsyncStepRegistry::new());
        let step = ResolveDirectivesStep::new(Arc::clone(&registry));
        let delivery_id = claimed_delivery(&store).await;

        let succeed = StepId::new();
        let fail = StepId::new();
        let deadline = Utc::now() + chrono::Duration::minutes(5);
        let rx_ok = registry
            .register(succeed, WorkflowId::new(), "notify_restaurant", deadline)
            .unwrap();
        let rx_fail = registry
            .register(fail, WorkflowId::new(), "find_driver", deadline)
            .unwrap();

        let mut ctx = UpdateContext::new(
            UpdateDeliveryInput::new(delivery_id, DeliveryUpdate::new())
                .with_resolve_success(succeed)
                .with_resolve_failure(fail),
        );
        step.execute(&mut ctx, &handle()).await.unwrap();

        assert!(matches!(rx_ok.await.unwrap(), StepResolution::Success { .. }));
        assert!(matches!(rx_fail.await.unwrap(), StepResolution::Failure { .. }));
    }

    #[tokio::test]
    async fn test_directive_on_settled_token_is_noop() {
        let registry = Arc::new(AsyncStepRegistry::new());
        let step = ResolveDirectivesStep::new(registry);

        let mut ctx = UpdateContext::new(
            UpdateDeliveryInput::new(domain::DeliveryId::new(), DeliveryUpdate::new())
                .with_resolve_success(StepId::new()),
        );
        let outcome = step.execute(&mut ctx, &handle()).await.unwrap();
        assert_eq!(outcome, StepOutcome::completed());
    }
}
