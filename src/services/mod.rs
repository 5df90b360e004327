//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

pub mod booking_service;
pub mod ledger;
pub mod momo_provider;
pub mod notification_service;
pub mod payment_service;
pub mod seat_inventory;
pub mod signing;
pub mod wallet_service;
