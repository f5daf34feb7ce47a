//! Concrete workflow steps for the delivery lifecycle.

mod claim_delivery;
mod create_delivery;
mod find_driver;
mod mark_awaiting_driver;
mod notify_restaurant;
mod update_delivery;

pub use claim_delivery::{ClaimDeliveryStep, RemoveDriverOffersStep, ResolvePendingStep};
pub use create_delivery::CreateDeliveryStep;
pub use find_driver::FindDriverStep;
pub use mark_awaiting_driver::MarkAwaitingDriverStep;
pub use notify_restaurant::NotifyRestaurantStep;
pub use update_delivery::{ResolveDirectivesStep, UpdateDeliveryStep};
