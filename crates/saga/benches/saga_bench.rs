use std::sync::Arc;

use chrono::Utc;
use common::{StepId, WorkflowId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Driver, LineItem, Money, Restaurant, TransactionId};
use saga::{AsyncStepRegistry, DeliveryWorkflowConfig, InMemoryEventBus, SagaCoordinator};
use store::{DeliveryStore, InMemoryDeliveryStore};

fn bench_registry_register_resolve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("registry/register_resolve", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = Arc::new(AsyncStepRegistry::new());
                let token = StepId::new();
                let rx = registry
                    .register(
                        token,
                        WorkflowId::new(),
                        "notify_restaurant",
                        Utc::now() + chrono::Duration::minutes(5),
                    )
                    .unwrap();
                registry
                    .resolve_success(token, serde_json::Value::Null)
                    .unwrap();
                rx.await.unwrap();
            });
        });
    });
}

fn bench_registry_expire_sweep(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("registry/expire_64_overdue", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = AsyncStepRegistry::new();
                let past = Utc::now() - chrono::Duration::seconds(1);
                let receivers: Vec<_> = (0..64)
                    .map(|_| {
                        registry
                            .register(StepId::new(), WorkflowId::new(), "find_driver", past)
                            .unwrap()
                    })
                    .collect();
                assert_eq!(registry.expire_overdue(Utc::now()), 64);
                drop(receivers);
            });
        });
    });
}

fn bench_claim_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (coordinator, store, restaurant_id, driver_id) = rt.block_on(async {
        let store = InMemoryDeliveryStore::new();
        let bus = InMemoryEventBus::new();
        let coordinator = Arc::new(SagaCoordinator::with_config(
            store.clone(),
            bus,
            DeliveryWorkflowConfig::default(),
        ));
        let restaurant = store
            .insert_restaurant(Restaurant::new("Luigi's", "12 Via Roma"))
            .await
            .unwrap();
        let driver = store
            .insert_driver(Driver::new("Dana", "555-0101"))
            .await
            .unwrap();
        (coordinator, store, restaurant.id, driver.id)
    });

    c.bench_function("saga/claim_delivery", |b| {
        b.iter(|| {
            rt.block_on(async {
                let delivery = store
                    .create(
                        TransactionId::new("T-bench"),
                        restaurant_id,
                        vec![
                            LineItem::new("SKU-001", "Margherita Pizza", 1, Money::from_cents(1200))
                                .unwrap(),
                        ],
                    )
                    .await
                    .unwrap();
                coordinator
                    .claim_delivery(delivery.id(), driver_id)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_registry_register_resolve,
    bench_registry_expire_sweep,
    bench_claim_delivery
);
criterion_main!(benches);
