//! HTTP API server with observability for the delivery platform.
//!
//! Provides REST endpoints for delivery dispatch, driver claims, and
//! status updates, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{DeliveryWorkflowConfig, InMemoryEventBus, SagaCoordinator};
use store::{DeliveryStore, InMemoryDeliveryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::deliveries::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DeliveryStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/deliveries", post(routes::deliveries::create::<S>))
        .route("/deliveries/{id}", get(routes::deliveries::get::<S>))
        .route("/deliveries/{id}/claim", post(routes::deliveries::claim::<S>))
        .route(
            "/deliveries/{id}/status",
            post(routes::deliveries::update_status::<S>),
        )
        .route(
            "/deliveries/{id}/workflow",
            get(routes::deliveries::workflow_for_delivery::<S>),
        )
        .route("/workflows/{id}", get(routes::deliveries::workflow::<S>))
        .route(
            "/drivers",
            post(routes::directory::create_driver::<S>).get(routes::directory::list_drivers::<S>),
        )
        .route(
            "/drivers/{id}/deliveries",
            get(routes::deliveries::list_by_driver::<S>),
        )
        .route("/restaurants", post(routes::directory::create_restaurant::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by the in-memory store with
/// production workflow timing.
pub fn create_default_state() -> Arc<AppState<InMemoryDeliveryStore>> {
    create_state(DeliveryWorkflowConfig::default())
}

/// Creates application state with explicit workflow timing.
///
/// Must be called within a Tokio runtime; the coordinator spawns its
/// registry timeout sweep here.
pub fn create_state(
    workflow_config: DeliveryWorkflowConfig,
) -> Arc<AppState<InMemoryDeliveryStore>> {
    let store = InMemoryDeliveryStore::new();
    let bus = InMemoryEventBus::new();
    let coordinator = Arc::new(SagaCoordinator::with_config(
        store.clone(),
        bus,
        workflow_config,
    ));

    Arc::new(AppState { coordinator, store })
}
