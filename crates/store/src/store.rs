//! Delivery store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Delivery, DeliveryId, DeliveryStatus, DeliveryUpdate, Driver, DriverId, LineItem, Restaurant,
    RestaurantId, TransactionId,
};

use crate::error::Result;

/// Persistence collaborator for delivery, driver, and restaurant records.
///
/// The saga engine funnels every delivery mutation through this trait;
/// no other component writes a delivery directly. The one conditional
/// update is [`claim`](DeliveryStore::claim), which must be atomic so
/// that at most one of several racing drivers wins a given delivery.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Inserts a new delivery in `Created` status and returns it.
    async fn create(
        &self,
        transaction_id: TransactionId,
        restaurant_id: RestaurantId,
        items: Vec<LineItem>,
    ) -> Result<Delivery>;

    /// Loads a delivery by id, including soft-deleted records.
    async fn get(&self, id: DeliveryId) -> Result<Delivery>;

    /// Applies a validated partial update and returns the new record.
    async fn update(&self, id: DeliveryId, update: DeliveryUpdate) -> Result<Delivery>;

    /// Atomically claims the delivery for a driver.
    ///
    /// The update is conditioned on the current status permitting a claim
    /// and no driver being set; a loser observes
    /// [`DeliveryError::AlreadyClaimed`](domain::DeliveryError::AlreadyClaimed)
    /// and the record is left unmodified.
    async fn claim(
        &self,
        id: DeliveryId,
        driver_id: DriverId,
        eta: DateTime<Utc>,
    ) -> Result<Delivery>;

    /// Restores previously captured fields without transition validation.
    /// Reserved for compensating actions.
    async fn revert_fields(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        driver_id: Option<DriverId>,
        eta: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Soft-deletes the delivery, stamping it `Cancelled` if non-terminal.
    async fn soft_delete(&self, id: DeliveryId) -> Result<()>;

    /// Lists live deliveries claimed by the given driver.
    async fn list_by_driver(&self, driver_id: DriverId) -> Result<Vec<Delivery>>;

    // -- Directory --

    /// Inserts a restaurant record.
    async fn insert_restaurant(&self, restaurant: Restaurant) -> Result<Restaurant>;

    /// Loads a restaurant by id.
    async fn get_restaurant(&self, id: RestaurantId) -> Result<Restaurant>;

    /// Inserts a driver record.
    async fn insert_driver(&self, driver: Driver) -> Result<Driver>;

    /// Loads a driver by id.
    async fn get_driver(&self, id: DriverId) -> Result<Driver>;

    /// Lists all registered drivers.
    async fn list_drivers(&self) -> Result<Vec<Driver>>;

    // -- Pending driver offers --

    /// Records the set of drivers offered a delivery.
    async fn record_driver_offers(
        &self,
        delivery_id: DeliveryId,
        drivers: Vec<DriverId>,
    ) -> Result<()>;

    /// Returns the drivers currently offered a delivery.
    async fn driver_offers(&self, delivery_id: DeliveryId) -> Result<Vec<DriverId>>;

    /// Removes all pending offers for a delivery.
    async fn remove_driver_offers(&self, delivery_id: DeliveryId) -> Result<()>;
}
