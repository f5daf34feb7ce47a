//! The delivery record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeliveryError;
use super::mutations::DeliveryUpdate;
use super::status::DeliveryStatus;
use super::value_objects::{DeliveryId, DriverId, LineItem, Money, RestaurantId, TransactionId};

/// A delivery job for a single order.
///
/// The record is only ever mutated through orchestrated workflow steps;
/// every transition is validated against the status state machine.
/// Soft deletion marks the record rather than removing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    id: DeliveryId,
    transaction_id: TransactionId,
    restaurant_id: RestaurantId,
    driver_id: Option<DriverId>,
    status: DeliveryStatus,
    eta: Option<DateTime<Utc>>,
    items: Vec<LineItem>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Creates a new delivery in `Created` status.
    ///
    /// `transaction_id` and `restaurant_id` are required and immutable;
    /// the items list is fixed at creation.
    pub fn new(
        transaction_id: TransactionId,
        restaurant_id: RestaurantId,
        items: Vec<LineItem>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            transaction_id,
            restaurant_id,
            driver_id: None,
            status: DeliveryStatus::Created,
            eta: None,
            items,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    // -- Queries --

    /// Returns the delivery ID.
    pub fn id(&self) -> DeliveryId {
        self.id
    }

    /// Returns the originating order's transaction ID.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Returns the restaurant fulfilling the order.
    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    /// Returns the claiming driver, if any.
    pub fn driver_id(&self) -> Option<DriverId> {
        self.driver_id
    }

    /// Returns the current status.
    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// Returns the estimated arrival time, if computed.
    pub fn eta(&self) -> Option<DateTime<Utc>> {
        self.eta
    }

    /// Returns the line items.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Returns when the record was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the record was soft-deleted, if it was.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns true if the record has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the order total across all line items.
    pub fn total(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    // -- Transitions --

    /// Moves the delivery from `Created` to `AwaitingDriver`.
    pub fn mark_awaiting_driver(&mut self) -> Result<(), DeliveryError> {
        self.ensure_live()?;
        if !self.status.can_mark_awaiting_driver() {
            return Err(DeliveryError::InvalidStateTransition {
                current_status: self.status,
                action: "mark awaiting driver",
            });
        }
        self.status = DeliveryStatus::AwaitingDriver;
        Ok(())
    }

    /// Associates a driver with the delivery and recomputes the ETA.
    ///
    /// Fails with `AlreadyClaimed` when another driver holds the job,
    /// so a losing racer performs no mutation.
    pub fn claim(&mut self, driver_id: DriverId, eta: DateTime<Utc>) -> Result<(), DeliveryError> {
        self.ensure_live()?;
        if let Some(existing) = self.driver_id {
            return Err(DeliveryError::AlreadyClaimed {
                delivery_id: self.id,
                driver_id: existing,
            });
        }
        if !self.status.can_claim() {
            return Err(DeliveryError::InvalidStateTransition {
                current_status: self.status,
                action: "claim",
            });
        }
        self.driver_id = Some(driver_id);
        self.status = DeliveryStatus::PickupClaimed;
        self.eta = Some(eta);
        Ok(())
    }

    /// Marks the order picked up by the driver.
    pub fn mark_picked_up(&mut self) -> Result<(), DeliveryError> {
        self.ensure_live()?;
        if !self.status.can_mark_picked_up() {
            return Err(DeliveryError::InvalidStateTransition {
                current_status: self.status,
                action: "mark picked up",
            });
        }
        self.status = DeliveryStatus::InTransit;
        Ok(())
    }

    /// Marks the order delivered (terminal).
    pub fn mark_delivered(&mut self) -> Result<(), DeliveryError> {
        self.ensure_live()?;
        if !self.status.can_mark_delivered() {
            return Err(DeliveryError::InvalidStateTransition {
                current_status: self.status,
                action: "mark delivered",
            });
        }
        self.status = DeliveryStatus::Delivered;
        Ok(())
    }

    /// Cancels the delivery (terminal).
    pub fn cancel(&mut self) -> Result<(), DeliveryError> {
        if !self.status.can_cancel() {
            return Err(DeliveryError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }
        self.status = DeliveryStatus::Cancelled;
        Ok(())
    }

    /// Applies a partial update, validating any status change against the
    /// transition graph. A status equal to the current one is a no-op.
    pub fn apply_update(&mut self, update: &DeliveryUpdate) -> Result<(), DeliveryError> {
        self.ensure_live()?;
        if let Some(next) = update.status
            && next != self.status
        {
            if !self.status.can_transition_to(next) {
                return Err(DeliveryError::InvalidStateTransition {
                    current_status: self.status,
                    action: "update status",
                });
            }
            self.status = next;
        }
        if let Some(driver_id) = update.driver_id {
            self.driver_id = Some(driver_id);
        }
        if let Some(eta) = update.eta {
            self.eta = Some(eta);
        }
        Ok(())
    }

    /// Restores previously captured fields without transition validation.
    ///
    /// Only compensating actions use this; a forward path must go through
    /// the validated transition methods.
    pub fn restore(
        &mut self,
        status: DeliveryStatus,
        driver_id: Option<DriverId>,
        eta: Option<DateTime<Utc>>,
    ) {
        self.status = status;
        self.driver_id = driver_id;
        self.eta = eta;
    }

    /// Marks the record soft-deleted and cancelled.
    pub fn soft_delete(&mut self) {
        if self.status.can_cancel() {
            self.status = DeliveryStatus::Cancelled;
        }
        self.deleted_at = Some(Utc::now());
    }

    fn ensure_live(&self) -> Result<(), DeliveryError> {
        if self.is_deleted() {
            return Err(DeliveryError::Deleted {
                delivery_id: self.id,
            });
        }
        Ok(())
    }
}
