use domain::DeliveryError;
use thiserror::Error;

/// Errors that can occur when interacting with the delivery store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A domain rule rejected the mutation (illegal transition,
    /// already-claimed conflict, deleted record).
    #[error("Delivery error: {0}")]
    Domain(#[from] DeliveryError),
}

impl StoreError {
    /// Builds a not-found error for the given entity kind and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if this error is a losing claim race.
    pub fn is_already_claimed(&self) -> bool {
        matches!(self, StoreError::Domain(DeliveryError::AlreadyClaimed { .. }))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
