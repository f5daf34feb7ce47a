//! Integration tests for the delivery saga engine.

use std::sync::Arc;
use std::time::Duration;

use common::{StepId, WorkflowId};
use domain::{
    DeliveryId, DeliveryStatus, DeliveryUpdate, Driver, LineItem, Money, Restaurant, TransactionId,
};
use saga::delivery_lifecycle::{
    STEP_CREATE_DELIVERY, STEP_FIND_DRIVER, STEP_MARK_AWAITING_DRIVER, STEP_NOTIFY_RESTAURANT,
};
use saga::{
    DeliveryWorkflowConfig, DispatchDeliveryInput, InMemoryEventBus, SagaCoordinator, SagaError,
    SagaEvent, SagaState, UpdateDeliveryInput,
};
use store::{DeliveryStore, InMemoryDeliveryStore};

type TestCoordinator = SagaCoordinator<InMemoryDeliveryStore, InMemoryEventBus>;

struct TestHarness {
    coordinator: Arc<TestCoordinator>,
    store: InMemoryDeliveryStore,
    bus: InMemoryEventBus,
    restaurant: Restaurant,
    drivers: Vec<Driver>,
}

impl TestHarness {
    /// Harness with async deadlines far beyond test runtime; timeout
    /// paths use [`TestHarness::with_config`].
    async fn new() -> Self {
        Self::with_config(DeliveryWorkflowConfig {
            notify_restaurant_timeout: Duration::from_secs(60),
            notify_restaurant_retries: 2,
            find_driver_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(1),
            claim_eta: Duration::from_secs(1800),
            sweep_interval: Duration::from_millis(10),
        })
        .await
    }

    async fn with_config(config: DeliveryWorkflowConfig) -> Self {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        let coordinator = Arc::new(SagaCoordinator::with_config(
            store.clone(),
            bus.clone(),
            config,
        ));

        let restaurant = store
            .insert_restaurant(Restaurant::new("Luigi's", "12 Via Roma"))
            .await
            .unwrap();
        let mut drivers = Vec::new();
        for (name, phone) in [("Dana", "555-0101"), ("Robin", "555-0102")] {
            drivers.push(store.insert_driver(Driver::new(name, phone)).await.unwrap());
        }

        Self {
            coordinator,
            store,
            bus,
            restaurant,
            drivers,
        }
    }

    fn one_item() -> Vec<LineItem> {
        vec![LineItem::new("SKU-001", "Margherita Pizza", 1, Money::from_cents(1200)).unwrap()]
    }

    async fn start(&self, transaction: &str) -> WorkflowId {
        Arc::clone(&self.coordinator)
            .start_delivery(DispatchDeliveryInput::new(
                TransactionId::new(transaction),
                self.restaurant.id,
                Self::one_item(),
            ))
            .await
            .unwrap()
    }

    async fn wait_state(&self, workflow_id: WorkflowId, state: SagaState) {
        self.wait(|| {
            self.coordinator
                .get_saga(workflow_id)
                .is_some_and(|i| i.state() == state)
        })
        .await;
    }

    /// Waits until the saga is parked on the given step and returns the
    /// token an external resolver must present.
    async fn suspended_token(&self, workflow_id: WorkflowId, step_name: &str) -> StepId {
        self.wait(|| {
            self.coordinator
                .get_saga(workflow_id)
                .and_then(|i| i.suspended().map(|s| s.step_name == step_name))
                .unwrap_or(false)
        })
        .await;
        self.coordinator
            .get_saga(workflow_id)
            .and_then(|i| i.suspended().map(|s| s.token))
            .expect("saga parked on expected step")
    }

    async fn delivery_id(&self, workflow_id: WorkflowId) -> DeliveryId {
        self.wait(|| {
            self.coordinator
                .get_saga(workflow_id)
                .is_some_and(|i| i.delivery_id().is_some())
        })
        .await;
        self.coordinator
            .get_saga(workflow_id)
            .and_then(|i| i.delivery_id())
            .expect("delivery created")
    }

    /// Restaurant acknowledgment via the update-delivery bridge: no field
    /// change, just the success directive for the parked step.
    async fn ack_restaurant(&self, workflow_id: WorkflowId) {
        let delivery_id = self.delivery_id(workflow_id).await;
        let token = self.suspended_token(workflow_id, STEP_NOTIFY_RESTAURANT).await;
        self.coordinator
            .update_delivery(
                UpdateDeliveryInput::new(delivery_id, DeliveryUpdate::new())
                    .with_resolve_success(token),
            )
            .await
            .unwrap();
    }

    async fn wait_for_status(&self, delivery_id: DeliveryId, status: DeliveryStatus) {
        for _ in 0..1000 {
            if self.store.get(delivery_id).await.unwrap().status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("delivery never reached {status}");
    }

    async fn wait<F>(&self, mut check: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..1000 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached within timeout");
    }
}

#[tokio::test]
async fn test_t1_full_lifecycle_with_losing_second_claim() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T1").await;
    let delivery_id = h.delivery_id(workflow_id).await;

    // Restaurant acknowledges; the saga advances to awaiting-driver and
    // parks on find_driver.
    h.ack_restaurant(workflow_id).await;
    h.wait_for_status(delivery_id, DeliveryStatus::AwaitingDriver)
        .await;
    h.suspended_token(workflow_id, STEP_FIND_DRIVER).await;

    // Driver D1 claims.
    let d1 = h.drivers[0].id;
    let claimed = h.coordinator.claim_delivery(delivery_id, d1).await.unwrap();
    assert_eq!(claimed.status(), DeliveryStatus::PickupClaimed);
    assert_eq!(claimed.driver_id(), Some(d1));
    assert!(claimed.eta().is_some());

    // The parked dispatch saga resumes and completes.
    h.wait_state(workflow_id, SagaState::Completed).await;
    let instance = h.coordinator.get_saga(workflow_id).unwrap();
    assert_eq!(
        instance.committed_step_names(),
        vec![
            STEP_CREATE_DELIVERY,
            STEP_NOTIFY_RESTAURANT,
            STEP_MARK_AWAITING_DRIVER,
            STEP_FIND_DRIVER,
        ]
    );

    // Pending offers are torn down by the claim.
    assert!(h.store.driver_offers(delivery_id).await.unwrap().is_empty());

    // A second claim by D2 is rejected and mutates nothing.
    let d2 = h.drivers[1].id;
    let err = h
        .coordinator
        .claim_delivery(delivery_id, d2)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::AlreadyClaimed { .. }));
    let delivery = h.store.get(delivery_id).await.unwrap();
    assert_eq!(delivery.driver_id(), Some(d1));
    assert_eq!(delivery.status(), DeliveryStatus::PickupClaimed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_t2_notification_timeout_cancels_and_soft_deletes() {
    let h = TestHarness::with_config(DeliveryWorkflowConfig {
        notify_restaurant_timeout: Duration::from_millis(40),
        notify_restaurant_retries: 2,
        find_driver_timeout: Duration::from_secs(60),
        retry_backoff: Duration::from_millis(1),
        claim_eta: Duration::from_secs(1800),
        sweep_interval: Duration::from_millis(5),
    })
    .await;

    let workflow_id = h.start("T2").await;
    let delivery_id = h.delivery_id(workflow_id).await;

    // Never acknowledged: retries exhaust, then the cascade runs.
    h.wait_state(workflow_id, SagaState::Failed).await;

    // The notification was attempted once plus the configured retries.
    assert_eq!(
        h.bus
            .events_named(saga::delivery_lifecycle::EVENT_NOTIFY_RESTAURANT)
            .len(),
        3
    );

    let delivery = h.store.get(delivery_id).await.unwrap();
    assert_eq!(delivery.status(), DeliveryStatus::Cancelled);
    assert!(delivery.is_deleted());

    let instance = h.coordinator.get_saga(workflow_id).unwrap();
    assert!(instance.committed_steps().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_find_driver_timeout_compensates_in_reverse_order() {
    let h = TestHarness::with_config(DeliveryWorkflowConfig {
        notify_restaurant_timeout: Duration::from_secs(60),
        notify_restaurant_retries: 2,
        find_driver_timeout: Duration::from_millis(40),
        retry_backoff: Duration::from_millis(1),
        claim_eta: Duration::from_secs(1800),
        sweep_interval: Duration::from_millis(5),
    })
    .await;

    let workflow_id = h.start("T3").await;
    let delivery_id = h.delivery_id(workflow_id).await;
    h.ack_restaurant(workflow_id).await;

    // No driver ever claims: find_driver expires and the whole saga
    // unwinds.
    h.wait_state(workflow_id, SagaState::Failed).await;

    let delivery = h.store.get(delivery_id).await.unwrap();
    assert_eq!(delivery.status(), DeliveryStatus::Cancelled);
    assert!(delivery.is_deleted());
    assert!(h.store.driver_offers(delivery_id).await.unwrap().is_empty());

    // Compensations ran for exactly the committed steps 1..k-1, in
    // strict reverse commit order; the failed step itself never
    // compensates.
    let instance = h.coordinator.get_saga(workflow_id).unwrap();
    let compensated: Vec<String> = instance
        .history()
        .iter()
        .filter_map(|e| match e {
            SagaEvent::CompensationStepCompleted(data) => Some(data.step_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        compensated,
        vec![
            STEP_MARK_AWAITING_DRIVER.to_string(),
            STEP_NOTIFY_RESTAURANT.to_string(),
            STEP_CREATE_DELIVERY.to_string(),
        ]
    );
    assert!(!compensated.contains(&STEP_FIND_DRIVER.to_string()));
}

#[tokio::test]
async fn test_resolving_a_settled_step_is_a_noop() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T4").await;
    let token = h.suspended_token(workflow_id, STEP_NOTIFY_RESTAURANT).await;

    let registry = h.coordinator.registry();
    registry
        .resolve_success(token, serde_json::Value::Null)
        .unwrap();

    // Second resolution of the same token loses the race and must not
    // double-advance the saga.
    let err = registry
        .resolve_success(token, serde_json::Value::Null)
        .unwrap_err();
    assert!(matches!(err, SagaError::UnknownStepId(_)));
    let err = registry.resolve_failure(token, "too late").unwrap_err();
    assert!(matches!(err, SagaError::UnknownStepId(_)));

    // The saga advanced exactly once, to awaiting-driver.
    let delivery_id = h.delivery_id(workflow_id).await;
    h.wait_for_status(delivery_id, DeliveryStatus::AwaitingDriver)
        .await;
    h.wait_state(workflow_id, SagaState::Suspended).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_exactly_one_winner() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T5").await;
    let delivery_id = h.delivery_id(workflow_id).await;
    h.ack_restaurant(workflow_id).await;
    h.suspended_token(workflow_id, STEP_FIND_DRIVER).await;

    let mut racers = Vec::new();
    for i in 0..6 {
        racers.push(
            h.store
                .insert_driver(Driver::new(format!("Racer {i}"), "555-0199"))
                .await
                .unwrap(),
        );
    }

    let mut handles = Vec::new();
    for racer in &racers {
        let coordinator = Arc::clone(&h.coordinator);
        let driver = racer.id;
        handles.push(tokio::spawn(async move {
            coordinator.claim_delivery(delivery_id, driver).await
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(delivery) => winners.push(delivery),
            Err(SagaError::AlreadyClaimed { .. }) => losers += 1,
            Err(err) => panic!("unexpected claim error: {err}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 5);

    let delivery = h.store.get(delivery_id).await.unwrap();
    assert_eq!(delivery.driver_id(), winners[0].driver_id());
    assert_eq!(delivery.status(), DeliveryStatus::PickupClaimed);

    h.wait_state(workflow_id, SagaState::Completed).await;
}

#[tokio::test]
async fn test_claim_before_restaurant_ack_short_circuits_dispatch() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T6").await;
    let delivery_id = h.delivery_id(workflow_id).await;
    h.suspended_token(workflow_id, STEP_NOTIFY_RESTAURANT).await;

    // A driver claims while the restaurant acknowledgment is still
    // pending; the claim resolves whatever step is parked.
    let d1 = h.drivers[0].id;
    h.coordinator.claim_delivery(delivery_id, d1).await.unwrap();

    h.wait_state(workflow_id, SagaState::Completed).await;

    // The delivery went straight to claimed; awaiting-driver was skipped
    // as already advanced and find_driver completed without suspending.
    let delivery = h.store.get(delivery_id).await.unwrap();
    assert_eq!(delivery.status(), DeliveryStatus::PickupClaimed);
    assert_eq!(delivery.driver_id(), Some(d1));
    assert_eq!(
        h.bus
            .events_named(saga::delivery_lifecycle::EVENT_NOTIFY_DRIVERS)
            .len(),
        0
    );
}

#[tokio::test]
async fn test_later_stage_updates_reach_delivered() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T7").await;
    let delivery_id = h.delivery_id(workflow_id).await;
    h.ack_restaurant(workflow_id).await;
    h.suspended_token(workflow_id, STEP_FIND_DRIVER).await;
    h.coordinator
        .claim_delivery(delivery_id, h.drivers[0].id)
        .await
        .unwrap();
    h.wait_state(workflow_id, SagaState::Completed).await;

    for status in [DeliveryStatus::InTransit, DeliveryStatus::Delivered] {
        let updated = h
            .coordinator
            .update_delivery(UpdateDeliveryInput::new(
                delivery_id,
                DeliveryUpdate::new().with_status(status),
            ))
            .await
            .unwrap();
        assert_eq!(updated.status(), status);
    }

    // Delivered is terminal: nothing moves the record afterwards.
    let err = h
        .coordinator
        .update_delivery(UpdateDeliveryInput::new(
            delivery_id,
            DeliveryUpdate::new().with_status(DeliveryStatus::InTransit),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::Domain(_)));
}

#[tokio::test]
async fn test_start_returns_immediately_with_queryable_instance() {
    let h = TestHarness::new().await;
    let workflow_id = h.start("T8").await;

    let instance = h.coordinator.get_saga(workflow_id).unwrap();
    assert_eq!(instance.workflow_name(), "DeliveryDispatch");
    assert_eq!(instance.transaction_id().map(|t| t.as_str()), Some("T8"));

    let delivery_id = h.delivery_id(workflow_id).await;
    assert_eq!(
        h.coordinator.workflow_for_delivery(delivery_id),
        Some(workflow_id)
    );

    // Deliveries are queryable by driver after a claim.
    h.ack_restaurant(workflow_id).await;
    h.suspended_token(workflow_id, STEP_FIND_DRIVER).await;
    let driver = h.drivers[1].id;
    h.coordinator.claim_delivery(delivery_id, driver).await.unwrap();
    let listed = h.store.list_by_driver(driver).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), delivery_id);
}
