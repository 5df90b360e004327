//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Every core operation returns `Result<T, AppError>`. When an error is raised
/// inside a database transaction the transaction is dropped without commit, so
/// no partial seat reservation, balance change or booking survives it.
///
/// # Error Categories
///
/// - **Not found**: trip, booking, recipient or payment missing
/// - **Conflict**: seat already taken, invalid status transition, reused payment
/// - **Invalid input**: malformed amounts, PINs, seat lists
/// - **Unauthorized**: bad credentials, bad PIN, bad callback signature
/// - **Business rules**: insufficient funds, price mismatch, unsettled payment
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing, unknown or revoked access token.
    #[error("Unauthorized")]
    Unauthorized,

    /// The authenticated user does not have the role this operation needs.
    #[error("Forbidden")]
    Forbidden,

    /// Wallet PIN did not match the stored hash.
    #[error("Invalid PIN")]
    InvalidPin,

    /// The user has never set a wallet PIN.
    #[error("Wallet PIN has not been set")]
    PinNotSet,

    /// Mobile-money callback signature did not verify.
    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Trip not found")]
    TripNotFound,

    /// The trip exists but is not in `scheduled` status.
    #[error("Trip is not open for booking")]
    TripNotBookable,

    /// One or more requested seats were taken before this booking committed.
    ///
    /// Kept distinct from validation errors so clients can prompt a reselect.
    #[error("Seat no longer available, please reselect")]
    SeatConflict,

    /// Client-supplied total does not match the server-computed price.
    #[error("Price mismatch: expected {expected}, got {provided}")]
    PriceMismatch { expected: i64, provided: i64 },

    /// Account has insufficient balance for the requested operation.
    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Recipient not found")]
    RecipientNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    /// The referenced mobile-money payment never reached `SUCCESSFUL`.
    #[error("Payment not approved or timed out")]
    PaymentNotSettled,

    /// The mobile-money payment already backs another booking.
    #[error("Payment has already been used")]
    PaymentAlreadyUsed,

    /// The seats a settled payment was made for are gone; the amount went back
    /// to the passenger's wallet.
    #[error("Seats no longer available, payment refunded to wallet")]
    PaymentRefunded,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The mobile-money provider rejected or failed a request.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Unexpected failure that is not the caller's fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidPin => (StatusCode::UNAUTHORIZED, "invalid_pin"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::TripNotFound => (StatusCode::NOT_FOUND, "trip_not_found"),
            AppError::BookingNotFound => (StatusCode::NOT_FOUND, "booking_not_found"),
            AppError::RecipientNotFound => (StatusCode::NOT_FOUND, "recipient_not_found"),
            AppError::PaymentNotFound => (StatusCode::NOT_FOUND, "payment_not_found"),
            AppError::SeatConflict => (StatusCode::CONFLICT, "seat_conflict"),
            AppError::TripNotBookable => (StatusCode::CONFLICT, "trip_not_bookable"),
            AppError::PaymentAlreadyUsed => (StatusCode::CONFLICT, "payment_already_used"),
            AppError::PaymentRefunded => (StatusCode::CONFLICT, "payment_refunded"),
            AppError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_state_transition")
            }
            AppError::InsufficientFunds => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_balance")
            }
            AppError::PriceMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "price_mismatch"),
            AppError::PinNotSet => (StatusCode::UNPROCESSABLE_ENTITY, "pin_not_set"),
            AppError::PaymentNotSettled => {
                (StatusCode::UNPROCESSABLE_ENTITY, "payment_not_settled")
            }
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database, internal and provider errors are logged and replaced with a
/// generic message so driver details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "An internal error occurred".to_string()
            }
            AppError::Provider(_) => {
                tracing::error!(error = %self, "Payment provider failure");
                "Payment provider unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
