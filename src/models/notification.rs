//! Notification payloads emitted after a financial operation commits.
//!
//! # Format
//!
//! ```json
//! {
//!   "event_type": "payment.successful",
//!   "event_id": "550e8400-e29b-41d4-a716-446655440000",
//!   "user_id": "660e8400-e29b-41d4-a716-446655440001",
//!   "created_at": "2025-01-15T10:30:00Z",
//!   "data": { "external_transaction_id": "..." }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "wallet.transfer_received")]
    TransferReceived,
    #[serde(rename = "wallet.deposit_received")]
    DepositReceived,
    #[serde(rename = "booking.confirmed")]
    BookingConfirmed,
    #[serde(rename = "booking.cancelled")]
    BookingCancelled,
    #[serde(rename = "payment.successful")]
    PaymentSuccessful,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: NotificationKind,
    pub event_id: Uuid,
    /// Recipient of the notification
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(event_type: NotificationKind, user_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type,
            event_id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            data,
        }
    }
}
