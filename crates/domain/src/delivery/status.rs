//! Delivery status state machine.

use serde::{Deserialize, Serialize};

/// The status of a delivery in its lifecycle.
///
/// Status transitions:
/// ```text
/// Created ──► AwaitingDriver ──► PickupClaimed ──► InTransit ──► Delivered
///    │              │                  │               │
///    └──────────────┴──────────────────┴───────────────┴──► Cancelled
/// ```
///
/// A claim may also land directly on `Created` when a driver beats the
/// restaurant acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeliveryStatus {
    /// Delivery record exists, restaurant not yet notified/acknowledged.
    #[default]
    Created,

    /// Restaurant acknowledged, waiting for a driver to claim the job.
    AwaitingDriver,

    /// A driver claimed the delivery and is heading to the restaurant.
    PickupClaimed,

    /// Driver picked up the order and is en route to the customer.
    InTransit,

    /// Order was delivered (terminal state).
    Delivered,

    /// Delivery was cancelled and soft-deleted (terminal state).
    Cancelled,
}

impl DeliveryStatus {
    /// Returns true if a driver can claim the delivery in this status.
    pub fn can_claim(&self) -> bool {
        matches!(self, DeliveryStatus::Created | DeliveryStatus::AwaitingDriver)
    }

    /// Returns true if the delivery can move to awaiting-driver.
    pub fn can_mark_awaiting_driver(&self) -> bool {
        matches!(self, DeliveryStatus::Created)
    }

    /// Returns true if the driver can mark the order picked up.
    pub fn can_mark_picked_up(&self) -> bool {
        matches!(self, DeliveryStatus::PickupClaimed)
    }

    /// Returns true if the driver can mark the order delivered.
    pub fn can_mark_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::InTransit)
    }

    /// Returns true if the delivery can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Created, AwaitingDriver) => true,
            (Created, PickupClaimed) => true,
            (AwaitingDriver, PickupClaimed) => true,
            (PickupClaimed, InTransit) => true,
            (InTransit, Delivered) => true,
            (_, Cancelled) => !self.is_terminal(),
            _ => false,
        }
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Created => "Created",
            DeliveryStatus::AwaitingDriver => "AwaitingDriver",
            DeliveryStatus::PickupClaimed => "PickupClaimed",
            DeliveryStatus::InTransit => "InTransit",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
