use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Delivery, DeliveryId, DeliveryStatus, DeliveryUpdate, Driver, DriverId, LineItem, Restaurant,
    RestaurantId, TransactionId,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::DeliveryStore;

#[derive(Debug, Default)]
struct StoreState {
    deliveries: HashMap<DeliveryId, Delivery>,
    restaurants: HashMap<RestaurantId, Restaurant>,
    drivers: HashMap<DriverId, Driver>,
    driver_offers: HashMap<DeliveryId, Vec<DriverId>>,
}

/// In-memory delivery store implementation.
///
/// Provides the same interface a database-backed implementation would;
/// the claim compare-and-set runs under a single write lock, which gives
/// the required at-most-one-winner guarantee.
#[derive(Clone, Default)]
pub struct InMemoryDeliveryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryDeliveryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of delivery records, soft-deleted included.
    pub async fn delivery_count(&self) -> usize {
        self.state.read().await.deliveries.len()
    }

    /// Returns the number of deliveries with pending driver offers.
    pub async fn offer_count(&self) -> usize {
        self.state.read().await.driver_offers.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.deliveries.clear();
        state.restaurants.clear();
        state.drivers.clear();
        state.driver_offers.clear();
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn create(
        &self,
        transaction_id: TransactionId,
        restaurant_id: RestaurantId,
        items: Vec<LineItem>,
    ) -> Result<Delivery> {
        let delivery = Delivery::new(transaction_id, restaurant_id, items);
        let mut state = self.state.write().await;
        state.deliveries.insert(delivery.id(), delivery.clone());
        Ok(delivery)
    }

    async fn get(&self, id: DeliveryId) -> Result<Delivery> {
        let state = self.state.read().await;
        state
            .deliveries
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("delivery", id))
    }

    async fn update(&self, id: DeliveryId, update: DeliveryUpdate) -> Result<Delivery> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("delivery", id))?;
        delivery.apply_update(&update)?;
        Ok(delivery.clone())
    }

    async fn claim(
        &self,
        id: DeliveryId,
        driver_id: DriverId,
        eta: DateTime<Utc>,
    ) -> Result<Delivery> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("delivery", id))?;
        delivery.claim(driver_id, eta)?;
        Ok(delivery.clone())
    }

    async fn revert_fields(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        driver_id: Option<DriverId>,
        eta: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("delivery", id))?;
        delivery.restore(status, driver_id, eta);
        Ok(())
    }

    async fn soft_delete(&self, id: DeliveryId) -> Result<()> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("delivery", id))?;
        delivery.soft_delete();
        Ok(())
    }

    async fn list_by_driver(&self, driver_id: DriverId) -> Result<Vec<Delivery>> {
        let state = self.state.read().await;
        let mut deliveries: Vec<Delivery> = state
            .deliveries
            .values()
            .filter(|d| d.driver_id() == Some(driver_id) && !d.is_deleted())
            .cloned()
            .collect();
        deliveries.sort_by_key(|d| d.created_at());
        Ok(deliveries)
    }

    async fn insert_restaurant(&self, restaurant: Restaurant) -> Result<Restaurant> {
        let mut state = self.state.write().await;
        state.restaurants.insert(restaurant.id, restaurant.clone());
        Ok(restaurant)
    }

    async fn get_restaurant(&self, id: RestaurantId) -> Result<Restaurant> {
        let state = self.state.read().await;
        state
            .restaurants
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("restaurant", id))
    }

    async fn insert_driver(&self, driver: Driver) -> Result<Driver> {
        let mut state = self.state.write().await;
        state.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    async fn get_driver(&self, id: DriverId) -> Result<Driver> {
        let state = self.state.read().await;
        state
            .drivers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("driver", id))
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>> {
        let state = self.state.read().await;
        let mut drivers: Vec<Driver> = state.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(drivers)
    }

    async fn record_driver_offers(
        &self,
        delivery_id: DeliveryId,
        drivers: Vec<DriverId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.deliveries.contains_key(&delivery_id) {
            return Err(StoreError::not_found("delivery", delivery_id));
        }
        state.driver_offers.insert(delivery_id, drivers);
        Ok(())
    }

    async fn driver_offers(&self, delivery_id: DeliveryId) -> Result<Vec<DriverId>> {
        let state = self.state.read().await;
        Ok(state
            .driver_offers
            .get(&delivery_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_driver_offers(&self, delivery_id: DeliveryId) -> Result<()> {
        let mut state = self.state.write().await;
        state.driver_offers.remove(&delivery_id);
        Ok(())
    }
}
