//! Booking data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Lifecycle of a booking. Only `Confirmed` has outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (
                BookingStatus::Confirmed,
                BookingStatus::Cancelled | BookingStatus::Completed
            )
        )
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            _ => Err(UnknownVariant {
                kind: "booking status",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "wallet" => Ok(PaymentMethod::Wallet),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            _ => Err(UnknownVariant {
                kind: "payment method",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Paid,
    Refunded,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Paid => "paid",
            BookingPaymentStatus::Refunded => "refunded",
        }
    }
}

impl TryFrom<String> for BookingPaymentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "paid" => Ok(BookingPaymentStatus::Paid),
            "refunded" => Ok(BookingPaymentStatus::Refunded),
            _ => Err(UnknownVariant {
                kind: "booking payment status",
                value,
            }),
        }
    }
}

/// Represents a booking record from the database.
///
/// Created only by a committed booking transaction. After that only
/// `status` and `payment_status` change.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Booking {
    pub id: Uuid,

    /// Human-readable reference printed on the ticket, e.g. `BK-7Q2M9XKD`
    pub reference: String,

    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub seat_ids: Vec<String>,

    /// `route.base_price_cents × seat count`, computed server-side
    pub total_price_cents: i64,

    #[sqlx(try_from = "String")]
    pub status: BookingStatus,

    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,

    #[sqlx(try_from = "String")]
    pub payment_status: BookingPaymentStatus,

    /// Generated id for wallet payments, the provider correlation id for mobile money
    pub payment_transaction_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How the passenger pays for a booking.
///
/// ```json
/// { "method": "wallet" }
/// { "method": "mobile_money", "transaction_id": "3f1c..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentChoice {
    Wallet,
    /// Settle with a mobile-money payment that already reached `SUCCESSFUL`.
    MobileMoney { transaction_id: Uuid },
}

impl PaymentChoice {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentChoice::Wallet => PaymentMethod::Wallet,
            PaymentChoice::MobileMoney { .. } => PaymentMethod::MobileMoney,
        }
    }
}

/// Request body for `POST /api/v1/bookings`.
///
/// ```json
/// {
///   "trip_id": "550e8400-e29b-41d4-a716-446655440000",
///   "seat_ids": ["12A", "12B"],
///   "payment": { "method": "wallet" },
///   "total_price_cents": 1000000
/// }
/// ```
///
/// `total_price_cents` is what the client displayed; it is checked against
/// the server-computed price and never trusted.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub seat_ids: Vec<String>,
    pub payment: PaymentChoice,
    pub total_price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub reference: String,
    pub trip_id: Uuid,
    pub seat_ids: Vec<String>,
    pub total_price_cents: i64,
    pub status: BookingStatus,
    pub payment: BookingPaymentResponse,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BookingPaymentResponse {
    pub method: PaymentMethod,
    pub status: BookingPaymentStatus,
    pub transaction_id: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            reference: booking.reference,
            trip_id: booking.trip_id,
            seat_ids: booking.seat_ids,
            total_price_cents: booking.total_price_cents,
            status: booking.status,
            payment: BookingPaymentResponse {
                method: booking.payment_method,
                status: booking.payment_status,
                transaction_id: booking.payment_transaction_id,
            },
            created_at: booking.created_at,
        }
    }
}
