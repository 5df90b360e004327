//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the typed request/response bodies of the HTTP API.

/// Booking records and payment methods
pub mod booking;
/// Notifications delivered after commit
pub mod notification;
/// Mobile-money pending payments
pub mod payment;
/// Trips and seat maps
pub mod trip;
/// Platform users as seen by the wallet core
pub mod user;
/// Wallets and ledger rows
pub mod wallet;

/// A stored text value that does not name any known enum variant.
///
/// Returned by the `TryFrom<String>` conversions sqlx uses when decoding
/// TEXT status/type columns.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
