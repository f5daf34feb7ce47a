//! Domain layer for the delivery platform.
//!
//! This crate provides the core delivery model:
//! - Delivery record with validated lifecycle transitions
//! - DeliveryStatus state machine
//! - Value objects (typed ids, money, line items)
//! - DeliveryUpdate mutation record
//! - Driver and Restaurant directory records

pub mod delivery;
pub mod directory;

pub use delivery::{
    Delivery, DeliveryError, DeliveryId, DeliveryStatus, DeliveryUpdate, DriverId, LineItem,
    Money, ProductId, RestaurantId, TransactionId,
};
pub use directory::{Driver, Restaurant};
