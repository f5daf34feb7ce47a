//! Driver and restaurant directory records.
//!
//! Thin records backing the external directory CRUD; the saga only needs
//! them to verify restaurant links and enumerate claim candidates.

use serde::{Deserialize, Serialize};

use crate::delivery::{DriverId, RestaurantId};

/// A courier who can claim deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub phone: String,
}

impl Driver {
    /// Creates a new driver with a fresh ID.
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: DriverId::new(),
            name: name.into(),
            phone: phone.into(),
        }
    }
}

/// A restaurant fulfilling delivery orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub address: String,
}

impl Restaurant {
    /// Creates a new restaurant with a fresh ID.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: RestaurantId::new(),
            name: name.into(),
            address: address.into(),
        }
    }
}
