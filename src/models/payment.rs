//! Mobile-money payment models.
//!
//! # Payment Flow
//!
//! 1. Passenger calls `POST /api/v1/payments/momo` with a booking intent
//! 2. A `PENDING` row is stored and the provider is asked to charge the phone
//! 3. The provider later calls `POST /api/v1/payments/momo/callback`
//! 4. The row moves to `SUCCESSFUL` or `FAILED`, exactly once
//! 5. The passenger books with `{"method": "mobile_money", "transaction_id": ...}`
//!
//! If the paid-for seats are gone by the time the payment settles or the
//! passenger books, the amount is refunded to the wallet instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::UnknownVariant;

/// Three-state payment lifecycle. `Successful` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomoStatus {
    Pending,
    Successful,
    Failed,
}

impl MomoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomoStatus::Pending => "PENDING",
            MomoStatus::Successful => "SUCCESSFUL",
            MomoStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MomoStatus::Pending)
    }

    /// Whether a row in this state may move to `next`.
    pub fn can_transition_to(&self, next: MomoStatus) -> bool {
        *self == MomoStatus::Pending && next.is_terminal()
    }
}

impl TryFrom<String> for MomoStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(MomoStatus::Pending),
            "SUCCESSFUL" => Ok(MomoStatus::Successful),
            "FAILED" => Ok(MomoStatus::Failed),
            _ => Err(UnknownVariant {
                kind: "payment status",
                value,
            }),
        }
    }
}

/// What the passenger intends to book once the payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingIntent {
    pub trip_id: Uuid,
    pub seat_ids: Vec<String>,
    pub total_price_cents: i64,
}

/// Represents a `pending_payments` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingPayment {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Correlation id shared with the provider (`X-Reference-Id` / `externalId`)
    pub external_transaction_id: Uuid,

    pub phone_number: String,

    /// Server-computed amount charged to the phone
    pub amount_cents: i64,

    pub booking_payload: Json<BookingIntent>,

    #[sqlx(try_from = "String")]
    pub status: MomoStatus,

    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,

    /// Set when the amount went back to the wallet because the seats could no
    /// longer be booked. A refunded payment cannot back a booking.
    pub refunded_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/v1/payments/momo`.
///
/// ```json
/// {
///   "phone_number": "+250788123456",
///   "booking": {
///     "trip_id": "550e8400-e29b-41d4-a716-446655440000",
///     "seat_ids": ["3C"],
///     "total_price_cents": 500000
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct InitiateMomoRequest {
    pub phone_number: String,
    pub booking: BookingIntent,
}

#[derive(Debug, Serialize)]
pub struct InitiateMomoResponse {
    pub message: String,
    pub external_transaction_id: Uuid,
}

/// Body the provider posts to the callback endpoint.
///
/// Only `externalId` and `status` matter to reconciliation; other provider
/// fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MomoCallback {
    #[serde(rename = "externalId", alias = "external_id")]
    pub external_id: String,
    pub status: String,
}

/// Response body for `GET /api/v1/payments/momo/{external_id}`.
#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub external_transaction_id: Uuid,
    pub status: MomoStatus,
    pub amount_cents: i64,
    pub booking: BookingIntent,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<PendingPayment> for PaymentStatusResponse {
    fn from(payment: PendingPayment) -> Self {
        Self {
            external_transaction_id: payment.external_transaction_id,
            status: payment.status,
            amount_cents: payment.amount_cents,
            booking: payment.booking_payload.0,
            created_at: payment.created_at,
            resolved_at: payment.resolved_at,
            refunded_at: payment.refunded_at,
        }
    }
}
