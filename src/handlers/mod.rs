//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, auth context)
//! 2. Calls the matching service operation
//! 3. Returns HTTP response (JSON, status code)

/// Agent cash deposits
pub mod agents;
/// Booking creation and cancellation
pub mod bookings;
/// Liveness and database connectivity
pub mod health;
/// Mobile-money initiation, polling and provider callback
pub mod payments;
/// Wallet balance, history, top-up, transfer and PIN
pub mod wallet;
