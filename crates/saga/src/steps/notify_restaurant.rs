//! Notify-restaurant step.

use async_trait::async_trait;
use store::DeliveryStore;

use crate::delivery_lifecycle::{DispatchContext, EVENT_NOTIFY_RESTAURANT, STEP_NOTIFY_RESTAURANT};
use crate::error::Result;
use crate::services::EventBus;
use crate::step::{
    CompensationData, RetryPolicy, StepHandle, StepOutcome, WorkflowStep, require_delivery_id,
};

/// Publishes the prepare-order signal and suspends awaiting the
/// restaurant's acknowledgment.
///
/// Fails fatally when the delivery or its restaurant link cannot be
/// found. The published payload carries the step token the acknowledging
/// caller must present to resume the saga.
pub struct NotifyRestaurantStep<S, N> {
    store: S,
    notifier: N,
    policy: RetryPolicy,
}

impl<S, N> NotifyRestaurantStep<S, N> {
    pub fn new(store: S, notifier: N, policy: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }
}

#[async_trait]
impl<S, N> WorkflowStep<DispatchContext> for NotifyRestaurantStep<S, N>
where
    S: DeliveryStore,
    N: EventBus,
{
    fn name(&self) -> &'static str {
        STEP_NOTIFY_RESTAURANT
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn execute(
        &self,
        ctx: &mut DispatchContext,
        handle: &StepHandle,
    ) -> Result<StepOutcome> {
        let delivery_id = require_delivery_id(ctx.delivery_id, STEP_NOTIFY_RESTAURANT)?;
        let delivery = self.store.get(delivery_id).await?;
        let restaurant = self.store.get_restaurant(delivery.restaurant_id()).await?;

        self.notifier
            .publish(
                EVENT_NOTIFY_RESTAURANT,
                serde_json::json!({
                    "restaurant_id": restaurant.id,
                    "delivery_id": delivery_id,
                    "step_id": handle.token,
                }),
            )
            .await?;
        tracing::info!(
            %delivery_id,
            restaurant_id = %restaurant.id,
            "restaurant notified, awaiting acknowledgment"
        );

        Ok(StepOutcome::suspended_with(
            CompensationData::NotifiedRestaurant { delivery_id },
        ))
    }

    async fn compensate(&self, _ctx: &DispatchContext, data: &CompensationData) -> Result<()> {
        // Declared non-fatal outcome: a published notification cannot be
        // recalled, so rollback is a structured log plus a counter.
        if let CompensationData::NotifiedRestaurant { delivery_id } = data {
            tracing::error!(
                %delivery_id,
                "restaurant notification could not be honored; delivery rolled back"
            );
            metrics::counter!("compensation_noop_total").increment(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{StepId, WorkflowId};
    use domain::{LineItem, Money, Restaurant, RestaurantId, TransactionId};
    use store::InMemoryDeliveryStore;

    use crate::delivery_lifecycle::{DeliveryWorkflowConfig, DispatchDeliveryInput};
    use crate::error::SagaError;
    use crate::services::InMemoryEventBus;

    fn handle() -> StepHandle {
        StepHandle {
            workflow_id: WorkflowId::new(),
            token: StepId::new(),
            attempt: 1,
        }
    }

    fn step(
        store: &InMemoryDeliveryStore,
        bus: &InMemoryEventBus,
    ) -> NotifyRestaurantStep<InMemoryDeliveryStore, InMemoryEventBus> {
        NotifyRestaurantStep::new(
            store.clone(),
            bus.clone(),
            DeliveryWorkflowConfig::default().notify_restaurant_policy(),
        )
    }

    async fn created_context(store: &InMemoryDeliveryStore) -> DispatchContext {
        let restaurant = store
            .insert_restaurant(Restaurant::new("Luigi's", "12 Via Roma"))
            .await
            .unwrap();
        let delivery = store
            .create(
                TransactionId::new("T1"),
                restaurant.id,
                vec![LineItem::new("SKU-001", "Margherita Pizza", 1, Money::from_cents(1200))
                    .unwrap()],
            )
            .await
            .unwrap();
        let mut ctx = DispatchContext::new(DispatchDeliveryInput::new(
            TransactionId::new("T1"),
            restaurant.id,
            vec![],
        ));
        ctx.delivery_id = Some(delivery.id());
        ctx
    }

    #[tokio::test]
    async fn test_publishes_event_with_step_token_and_suspends() {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        let step = step(&store, &bus);
        let mut ctx = created_context(&store).await;
        let handle = handle();

        let outcome = step.execute(&mut ctx, &handle).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Suspended { .. }));

        let events = bus.events_named(EVENT_NOTIFY_RESTAURANT);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].payload["step_id"],
            serde_json::to_value(handle.token).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_restaurant_is_fatal_not_found() {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        let step = step(&store, &bus);

        // Delivery referencing a restaurant that was never registered.
        let delivery = store
            .create(TransactionId::new("T1"), RestaurantId::new(), vec![])
            .await
            .unwrap();
        let mut ctx = DispatchContext::new(DispatchDeliveryInput::new(
            TransactionId::new("T1"),
            delivery.restaurant_id(),
            vec![],
        ));
        ctx.delivery_id = Some(delivery.id());

        let err = step.execute(&mut ctx, &handle()).await.unwrap_err();
        assert!(matches!(err, SagaError::NotFound { entity: "restaurant", .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_publish_failure_is_retryable() {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);
        let step = step(&store, &bus);
        let mut ctx = created_context(&store).await;

        let err = step.execute(&mut ctx, &handle()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_compensation_is_nonfatal() {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        let step = step(&store, &bus);
        let ctx = created_context(&store).await;

        step.compensate(
            &ctx,
            &CompensationData::NotifiedRestaurant {
                delivery_id: ctx.delivery_id.unwrap(),
            },
        )
        .await
        .unwrap();
    }
}
