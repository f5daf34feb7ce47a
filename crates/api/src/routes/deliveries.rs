//! Delivery lifecycle and saga trigger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};
use domain::{
    Delivery, DeliveryId, DeliveryStatus, DeliveryUpdate, DriverId, LineItem, Money, RestaurantId,
    TransactionId,
};
use saga::{
    DispatchDeliveryInput, InMemoryEventBus, SagaCoordinator, SagaInstance, UpdateDeliveryInput,
};
use serde::{Deserialize, Serialize};
use store::DeliveryStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DeliveryStore + Clone + 'static> {
    pub coordinator: Arc<SagaCoordinator<S, InMemoryEventBus>>,
    pub store: S,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub transaction_id: String,
    pub restaurant_id: String,
    pub items: Vec<LineItemRequest>,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub driver_id: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<DeliveryStatus>,
    pub eta: Option<DateTime<Utc>>,
    pub step_to_succeed: Option<StepId>,
    pub step_to_fail: Option<StepId>,
}

// -- Response types --

#[derive(Serialize)]
pub struct DeliveryStartedResponse {
    pub workflow_id: String,
}

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub id: String,
    pub transaction_id: String,
    pub restaurant_id: String,
    pub driver_id: Option<String>,
    pub status: String,
    pub eta: Option<String>,
    pub items: Vec<LineItemResponse>,
    pub total_cents: i64,
    pub deleted: bool,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct SuspendedStepResponse {
    pub step_name: String,
    pub step_id: String,
    pub deadline: String,
}

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub workflow_id: String,
    pub workflow_name: String,
    pub transaction_id: Option<String>,
    pub delivery_id: Option<String>,
    pub state: String,
    pub current_step: usize,
    pub committed_steps: Vec<String>,
    pub suspended: Option<SuspendedStepResponse>,
    pub failure_reason: Option<String>,
}

impl DeliveryResponse {
    fn from_delivery(delivery: &Delivery) -> Self {
        Self {
            id: delivery.id().to_string(),
            transaction_id: delivery.transaction_id().to_string(),
            restaurant_id: delivery.restaurant_id().to_string(),
            driver_id: delivery.driver_id().map(|d| d.to_string()),
            status: delivery.status().to_string(),
            eta: delivery.eta().map(|t| t.to_rfc3339()),
            items: delivery
                .items()
                .iter()
                .map(|item| LineItemResponse {
                    product_id: item.product_id.to_string(),
                    title: item.title.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            total_cents: delivery.total().cents(),
            deleted: delivery.is_deleted(),
        }
    }
}

impl WorkflowResponse {
    fn from_instance(workflow_id: WorkflowId, instance: &SagaInstance) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            workflow_name: instance.workflow_name().to_string(),
            transaction_id: instance.transaction_id().map(|t| t.to_string()),
            delivery_id: instance.delivery_id().map(|d| d.to_string()),
            state: instance.state().to_string(),
            current_step: instance.current_step(),
            committed_steps: instance
                .committed_step_names()
                .into_iter()
                .map(String::from)
                .collect(),
            suspended: instance.suspended().map(|s| SuspendedStepResponse {
                step_name: s.step_name.clone(),
                step_id: s.token.to_string(),
                deadline: s.deadline.to_rfc3339(),
            }),
            failure_reason: instance.failure_reason().map(String::from),
        }
    }
}

// -- Handlers --

/// POST /deliveries — start the dispatch saga for an order.
///
/// Returns the workflow instance ID immediately; the saga continues
/// asynchronously.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<(axum::http::StatusCode, Json<DeliveryStartedResponse>), ApiError> {
    let restaurant_id = RestaurantId::from_uuid(parse_uuid(&req.restaurant_id, "restaurant_id")?);

    let mut items = Vec::with_capacity(req.items.len());
    for item in &req.items {
        items.push(
            LineItem::new(
                item.product_id.as_str(),
                item.title.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        );
    }

    let workflow_id = state
        .coordinator
        .clone()
        .start_delivery(DispatchDeliveryInput::new(
            TransactionId::new(req.transaction_id),
            restaurant_id,
            items,
        ))
        .await?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(DeliveryStartedResponse {
            workflow_id: workflow_id.to_string(),
        }),
    ))
}

/// GET /deliveries/:id — load a delivery by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let delivery_id = DeliveryId::from_uuid(parse_uuid(&id, "delivery id")?);
    let delivery = state.store.get(delivery_id).await?;
    Ok(Json(DeliveryResponse::from_delivery(&delivery)))
}

/// POST /deliveries/:id/claim — a driver claims the delivery.
///
/// Returns 409 when another driver already holds the job.
#[tracing::instrument(skip(state, req))]
pub async fn claim<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let delivery_id = DeliveryId::from_uuid(parse_uuid(&id, "delivery id")?);
    let driver_id = DriverId::from_uuid(parse_uuid(&req.driver_id, "driver_id")?);

    let claimed = state.coordinator.claim_delivery(delivery_id, driver_id).await?;
    Ok(Json(DeliveryResponse::from_delivery(&claimed)))
}

/// POST /deliveries/:id/status — apply a status/field update, optionally
/// resolving suspended step directives.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let delivery_id = DeliveryId::from_uuid(parse_uuid(&id, "delivery id")?);

    let mut update = DeliveryUpdate::new();
    if let Some(status) = req.status {
        update = update.with_status(status);
    }
    if let Some(eta) = req.eta {
        update = update.with_eta(eta);
    }

    let mut input = UpdateDeliveryInput::new(delivery_id, update);
    if let Some(step_id) = req.step_to_succeed {
        input = input.with_resolve_success(step_id);
    }
    if let Some(step_id) = req.step_to_fail {
        input = input.with_resolve_failure(step_id);
    }

    let updated = state.coordinator.update_delivery(input).await?;
    Ok(Json(DeliveryResponse::from_delivery(&updated)))
}

/// GET /workflows/:id — saga status by workflow instance ID.
#[tracing::instrument(skip(state))]
pub async fn workflow<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow_id = WorkflowId::from_uuid(parse_uuid(&id, "workflow id")?);
    let instance = state
        .coordinator
        .get_saga(workflow_id)
        .ok_or_else(|| ApiError::NotFound(format!("Workflow {id} not found")))?;
    Ok(Json(WorkflowResponse::from_instance(workflow_id, &instance)))
}

/// GET /deliveries/:id/workflow — saga status by delivery ID.
#[tracing::instrument(skip(state))]
pub async fn workflow_for_delivery<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let delivery_id = DeliveryId::from_uuid(parse_uuid(&id, "delivery id")?);
    let workflow_id = state
        .coordinator
        .workflow_for_delivery(delivery_id)
        .ok_or_else(|| ApiError::NotFound(format!("No workflow for delivery {id}")))?;
    let instance = state
        .coordinator
        .get_saga(workflow_id)
        .ok_or_else(|| ApiError::Internal("workflow index out of sync".to_string()))?;
    Ok(Json(WorkflowResponse::from_instance(workflow_id, &instance)))
}

/// GET /drivers/:id/deliveries — live deliveries claimed by a driver.
#[tracing::instrument(skip(state))]
pub async fn list_by_driver<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryResponse>>, ApiError> {
    let driver_id = DriverId::from_uuid(parse_uuid(&id, "driver id")?);
    let deliveries = state.store.list_by_driver(driver_id).await?;
    Ok(Json(
        deliveries.iter().map(DeliveryResponse::from_delivery).collect(),
    ))
}

pub(crate) fn parse_uuid(id: &str, what: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
