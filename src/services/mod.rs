pub mod checkout;
pub mod coupons;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod reaper;
pub mod webhook_processor;
