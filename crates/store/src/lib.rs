pub mod error;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryDeliveryStore;
pub use store::DeliveryStore;
