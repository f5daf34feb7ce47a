//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DeliveryError;
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        // Losing a claim race is an expected rejection, not a failure.
        SagaError::AlreadyClaimed { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::InvalidState { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Domain(DeliveryError::InvalidStateTransition { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        SagaError::Domain(DeliveryError::AlreadyClaimed { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        SagaError::Domain(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Domain(_) => ApiError::Saga(SagaError::from(err)),
        }
    }
}
