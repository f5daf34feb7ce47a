//! Delivery record and related types.

mod mutations;
mod record;
mod status;
mod value_objects;

pub use mutations::DeliveryUpdate;
pub use record::Delivery;
pub use status::DeliveryStatus;
pub use value_objects::{
    DeliveryId, DriverId, LineItem, Money, ProductId, RestaurantId, TransactionId,
};

use thiserror::Error;

/// Errors that can occur during delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Delivery is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: DeliveryStatus,
        action: &'static str,
    },

    /// A driver has already claimed this delivery.
    #[error("Delivery {delivery_id} already claimed by driver {driver_id}")]
    AlreadyClaimed {
        delivery_id: DeliveryId,
        driver_id: DriverId,
    },

    /// Invalid line item quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The delivery has been soft-deleted and cannot be mutated.
    #[error("Delivery {delivery_id} has been deleted")]
    Deleted { delivery_id: DeliveryId },
}
