//! Mutation records applied to a delivery through orchestrated steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::DeliveryStatus;
use super::value_objects::DriverId;

/// A partial update to a delivery record.
///
/// Every field is explicitly optional; absent fields are left untouched.
/// Status changes are validated against the transition graph when the
/// update is applied, never silently defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    /// New status, validated against [`DeliveryStatus::can_transition_to`].
    pub status: Option<DeliveryStatus>,
    /// Driver to associate with the delivery.
    pub driver_id: Option<DriverId>,
    /// New estimated arrival time.
    pub eta: Option<DateTime<Utc>>,
}

impl DeliveryUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target status.
    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the driver.
    pub fn with_driver(mut self, driver_id: DriverId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    /// Sets the ETA.
    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Returns true if the update carries no changes.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.driver_id.is_none() && self.eta.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update() {
        assert!(DeliveryUpdate::new().is_empty());
        assert!(!DeliveryUpdate::new()
            .with_status(DeliveryStatus::InTransit)
            .is_empty());
    }

    #[test]
    fn builder_accumulates_fields() {
        let driver = DriverId::new();
        let update = DeliveryUpdate::new()
            .with_status(DeliveryStatus::PickupClaimed)
            .with_driver(driver);
        assert_eq!(update.status, Some(DeliveryStatus::PickupClaimed));
        assert_eq!(update.driver_id, Some(driver));
        assert!(update.eta.is_none());
    }
}
