//! Booking HTTP handlers.
//!
//! - POST /api/v1/bookings - Reserve seats and pay
//! - GET /api/v1/bookings/:id - Get booking details
//! - POST /api/v1/bookings/:id/cancel - Cancel and refund

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::booking::{BookingResponse, CreateBookingRequest},
    services::booking_service,
    state::AppState,
};

/// Create a booking.
///
/// # Request Body
///
/// ```json
/// {
///   "trip_id": "550e8400-...",
///   "seat_ids": ["12A"],
///   "payment": { "method": "wallet" },
///   "total_price_cents": 500000
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the confirmed booking
/// - **409 `seat_conflict`**: a seat was taken, reselect and retry
/// - **422 `price_mismatch`** / **`insufficient_balance`**
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking =
        booking_service::create_booking(&state.pool, &state.notifier, auth.user_id, request)
            .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// Returns 404 if the booking does not exist or belongs to someone else.
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = booking_service::get_booking(&state.pool, auth.user_id, booking_id).await?;
    Ok(Json(booking.into()))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking =
        booking_service::cancel_booking(&state.pool, &state.notifier, auth.user_id, booking_id)
            .await?;
    Ok(Json(booking.into()))
}
