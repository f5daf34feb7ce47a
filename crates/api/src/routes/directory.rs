//! Restaurant and driver directory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{Driver, Restaurant};
use serde::{Deserialize, Serialize};
use store::DeliveryStore;

use super::deliveries::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub address: String,
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: String,
}

#[derive(Serialize)]
pub struct RestaurantResponse {
    pub id: String,
    pub name: String,
    pub address: String,
}

#[derive(Serialize)]
pub struct DriverResponse {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// POST /restaurants — register a restaurant.
#[tracing::instrument(skip(state, req))]
pub async fn create_restaurant<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateRestaurantRequest>,
) -> Result<(axum::http::StatusCode, Json<RestaurantResponse>), ApiError> {
    let restaurant = state
        .store
        .insert_restaurant(Restaurant::new(req.name, req.address))
        .await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(RestaurantResponse {
            id: restaurant.id.to_string(),
            name: restaurant.name,
            address: restaurant.address,
        }),
    ))
}

/// POST /drivers — register a driver.
#[tracing::instrument(skip(state, req))]
pub async fn create_driver<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateDriverRequest>,
) -> Result<(axum::http::StatusCode, Json<DriverResponse>), ApiError> {
    let driver = state
        .store
        .insert_driver(Driver::new(req.name, req.phone))
        .await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(DriverResponse {
            id: driver.id.to_string(),
            name: driver.name,
            phone: driver.phone,
        }),
    ))
}

/// GET /drivers — list registered drivers.
#[tracing::instrument(skip(state))]
pub async fn list_drivers<S: DeliveryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<DriverResponse>>, ApiError> {
    let drivers = state.store.list_drivers().await?;
    Ok(Json(
        drivers
            .into_iter()
            .map(|d| DriverResponse {
                id: d.id.to_string(),
                name: d.name,
                phone: d.phone,
            })
            .collect(),
    ))
}
