//! Booking coordinator - seat reservation, price check, payment and booking
//! creation as one database transaction.
//!
//! # Atomicity Guarantees
//!
//! Everything between `pool.begin()` and `tx.commit()` either lands together
//! or not at all. Any `?` in between drops the transaction, which rolls back
//! the seat map, the wallet debit and the booking row. Two passengers racing
//! for the same seat serialize on the trip row lock; the loser sees the seat
//! occupied and gets `SeatConflict`.
//!
//! Lock order is always trip, then wallet. A mobile-money payment row is
//! locked before the trip, the same order callback resolution uses.

use std::{collections::BTreeSet, sync::Arc};

use rand::Rng;
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        booking::{Booking, BookingPaymentStatus, BookingStatus, CreateBookingRequest, PaymentChoice},
        notification::{Notification, NotificationKind},
        payment::{MomoStatus, PendingPayment},
        trip::TripStatus,
        wallet::TransactionType,
    },
    services::{
        ledger,
        notification_service::{self, Notifier},
        payment_service, seat_inventory,
    },
};

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_LENGTH: usize = 8;

/// Server-side price: `base_price_cents × seat_count`.
pub fn expected_total(base_price_cents: i64, seat_count: usize) -> Result<i64, AppError> {
    i64::try_from(seat_count)
        .ok()
        .and_then(|count| base_price_cents.checked_mul(count))
        .ok_or_else(|| AppError::InvalidRequest("Too many seats".to_string()))
}

/// Compare the client's displayed total against the server price.
pub fn verify_client_total(expected: i64, provided: i64) -> Result<(), AppError> {
    if expected != provided {
        return Err(AppError::PriceMismatch { expected, provided });
    }
    Ok(())
}

/// Human-readable booking reference such as `BK-7Q2M9XKD`.
///
/// Ambiguous characters (0/O, 1/I) are left out so references can be read over the phone.
pub fn generate_reference() -> String {
    let mut rng = rand::rng();
    let code: String = (0..REFERENCE_LENGTH)
        .map(|_| char::from(REFERENCE_ALPHABET[rng.random_range(0..REFERENCE_ALPHABET.len())]))
        .collect();
    format!("BK-{code}")
}

fn same_seats(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

/// Create a booking.
///
/// # Process
///
/// 1. For mobile money, lock the payment and check it is settled and unused;
///    if its seats can no longer be booked, refund it to the wallet and stop
/// 2. Lock the trip and check it is scheduled
/// 3. Check every requested seat is available
/// 4. Recompute the price and compare it to the client's total
/// 5. Take payment: debit the wallet, or claim the mobile-money payment
/// 6. Flip the seats to occupied
/// 7. Insert the booking with status `confirmed` and payment `paid`
/// 8. Commit, then notify the passenger
///
/// # Errors
///
/// - `TripNotFound` / `TripNotBookable`
/// - `SeatConflict`: a seat was taken (retryable with another selection)
/// - `PriceMismatch`: client total differs from the server price
/// - `InsufficientFunds`: wallet balance too low
/// - `PaymentNotFound` / `PaymentNotSettled` / `PaymentAlreadyUsed`: mobile-money problems
/// - `PaymentRefunded`: the paid-for seats are gone; the refund is committed
pub async fn create_booking(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    user_id: Uuid,
    request: CreateBookingRequest,
) -> Result<Booking, AppError> {
    seat_inventory::validate_seat_request(&request.seat_ids)?;

    let mut tx = pool.begin().await?;

    let momo_payment = match &request.payment {
        PaymentChoice::Wallet => None,
        PaymentChoice::MobileMoney { transaction_id } => {
            let payment = lock_claimable_payment(&mut *tx, user_id, *transaction_id).await?;
            if payment.booking_payload.trip_id == request.trip_id
                && payment_service::refund_if_unbookable(&mut *tx, &payment).await?
            {
                tx.commit().await?;
                notification_service::dispatch(
                    notifier,
                    payment_service::refund_notification(&payment),
                );
                return Err(AppError::PaymentRefunded);
            }
            Some(payment)
        }
    };

    let mut trip = seat_inventory::lock_trip(&mut *tx, request.trip_id).await?;
    seat_inventory::ensure_bookable(&trip)?;
    seat_inventory::check_seats(&trip, &request.seat_ids)?;

    let total = expected_total(trip.base_price_cents, request.seat_ids.len())?;
    verify_client_total(total, request.total_price_cents)?;

    let payment_transaction_id = match &momo_payment {
        None => {
            let entry = ledger::debit_wallet(
                &mut *tx,
                user_id,
                total,
                TransactionType::BookingDebit,
                &format!("Seats {} on trip {}", request.seat_ids.join(", "), trip.id),
            )
            .await?;
            entry.transaction.id.to_string()
        }
        Some(payment) => {
            check_claim(payment, trip.id, &request.seat_ids, total)?;
            payment.external_transaction_id.to_string()
        }
    };

    seat_inventory::reserve_seats(&mut *tx, &mut trip, &request.seat_ids).await?;

    let booking = sqlx::query_as::<_, Booking>(
        r#"
        INSERT INTO bookings (
            reference,
            user_id,
            trip_id,
            seat_ids,
            total_price_cents,
            status,
            payment_method,
            payment_status,
            payment_transaction_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(generate_reference())
    .bind(user_id)
    .bind(trip.id)
    .bind(&request.seat_ids)
    .bind(total)
    .bind(BookingStatus::Confirmed.as_str())
    .bind(request.payment.method().as_str())
    .bind(BookingPaymentStatus::Paid.as_str())
    .bind(payment_transaction_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        reference = %booking.reference,
        trip_id = %booking.trip_id,
        seats = booking.seat_ids.len(),
        "Booking confirmed"
    );

    notification_service::dispatch(
        notifier,
        Notification::new(
            NotificationKind::BookingConfirmed,
            user_id,
            json!({
                "booking_id": booking.id,
                "reference": booking.reference,
                "seat_ids": booking.seat_ids,
            }),
        ),
    );

    Ok(booking)
}

/// Lock one of the caller's mobile-money payments and check it can still
/// back a booking.
///
/// The row lock keeps two bookings from claiming it concurrently. Reuse is
/// also prevented by the unique `bookings.payment_transaction_id`.
async fn lock_claimable_payment(
    conn: &mut PgConnection,
    user_id: Uuid,
    external_id: Uuid,
) -> Result<PendingPayment, AppError> {
    let payment = payment_service::lock_payment(conn, external_id)
        .await?
        .filter(|p| p.user_id == user_id)
        .ok_or(AppError::PaymentNotFound)?;

    if payment.status != MomoStatus::Successful {
        return Err(AppError::PaymentNotSettled);
    }
    if payment.refunded_at.is_some() {
        return Err(AppError::PaymentAlreadyUsed);
    }

    let already_used: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM bookings WHERE payment_transaction_id = $1)",
    )
    .bind(external_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    if already_used {
        return Err(AppError::PaymentAlreadyUsed);
    }

    Ok(payment)
}

/// The booking must be for exactly the trip, seats and amount that were paid.
fn check_claim(
    payment: &PendingPayment,
    trip_id: Uuid,
    seat_ids: &[String],
    expected_total: i64,
) -> Result<(), AppError> {
    let intent = &payment.booking_payload;
    if intent.trip_id != trip_id || !same_seats(&intent.seat_ids, seat_ids) {
        return Err(AppError::InvalidRequest(
            "Booking does not match the seats that were paid for".to_string(),
        ));
    }

    verify_client_total(expected_total, payment.amount_cents)
}

/// Get one of the caller's bookings.
pub async fn get_booking(pool: &DbPool, user_id: Uuid, booking_id: Uuid) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 AND user_id = $2")
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::BookingNotFound)
}

/// Cancel a confirmed booking before departure.
///
/// Seats return to `available` and the full price is refunded to the
/// passenger's wallet, whichever method paid for it. All in one transaction.
///
/// # Errors
///
/// - `BookingNotFound`: not the caller's booking
/// - `InvalidStateTransition`: booking is already cancelled or completed
/// - `TripNotBookable`: the trip is no longer scheduled
pub async fn cancel_booking(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    user_id: Uuid,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    let mut tx = pool.begin().await?;

    let booking = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(booking_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::BookingNotFound)?;

    if !booking.status.can_transition_to(BookingStatus::Cancelled) {
        return Err(AppError::InvalidStateTransition {
            from: booking.status.as_str(),
            to: BookingStatus::Cancelled.as_str(),
        });
    }

    let mut trip = seat_inventory::lock_trip(&mut *tx, booking.trip_id).await?;
    if trip.status != TripStatus::Scheduled {
        return Err(AppError::TripNotBookable);
    }

    seat_inventory::release_seats(&mut *tx, &mut trip, &booking.seat_ids).await?;

    ledger::credit_wallet(
        &mut *tx,
        user_id,
        booking.total_price_cents,
        TransactionType::Refund,
        &format!("Refund for booking {}", booking.reference),
    )
    .await?;

    let cancelled = sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = $1,
            payment_status = $2,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(BookingStatus::Cancelled.as_str())
    .bind(BookingPaymentStatus::Refunded.as_str())
    .bind(booking.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(booking_id = %cancelled.id, reference = %cancelled.reference, "Booking cancelled");

    notification_service::dispatch(
        notifier,
        Notification::new(
            NotificationKind::BookingCancelled,
            user_id,
            json!({
                "booking_id": cancelled.id,
                "reference": cancelled.reference,
                "refunded_cents": cancelled.total_price_cents,
            }),
        ),
    );

    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::BookingIntent;

    #[test]
    fn test_expected_total() {
        assert_eq!(expected_total(500_000, 1).unwrap(), 500_000);
        assert_eq!(expected_total(500_000, 3).unwrap(), 1_500_000);
        assert!(expected_total(i64::MAX, 2).is_err());
    }

    #[test]
    fn test_client_total_must_match_exactly() {
        assert!(verify_client_total(1_000, 1_000).is_ok());
        assert!(matches!(
            verify_client_total(1_000, 999),
            Err(AppError::PriceMismatch {
                expected: 1_000,
                provided: 999
            })
        ));
        assert!(verify_client_total(1_000, 1_001).is_err());
    }

    #[test]
    fn test_reference_format() {
        let reference = generate_reference();
        assert_eq!(reference.len(), 3 + REFERENCE_LENGTH);
        assert!(reference.starts_with("BK-"));
        assert!(
            reference[3..]
                .bytes()
                .all(|b| REFERENCE_ALPHABET.contains(&b))
        );
    }

    fn settled_payment(trip_id: Uuid, seats: &[&str], amount_cents: i64) -> PendingPayment {
        let seat_ids: Vec<String> = seats.iter().map(|s| s.to_string()).collect();
        PendingPayment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            external_transaction_id: Uuid::new_v4(),
            phone_number: "250788123456".to_string(),
            amount_cents,
            booking_payload: sqlx::types::Json(BookingIntent {
                trip_id,
                seat_ids,
                total_price_cents: amount_cents,
            }),
            status: MomoStatus::Successful,
            created_at: chrono::Utc::now(),
            resolved_at: Some(chrono::Utc::now()),
            refunded_at: None,
        }
    }

    #[test]
    fn test_claim_must_match_paid_intent() {
        let trip_id = Uuid::new_v4();
        let payment = settled_payment(trip_id, &["2A", "2B"], 2_000);
        let seats = |s: &[&str]| s.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(check_claim(&payment, trip_id, &seats(&["2B", "2A"]), 2_000).is_ok());
        assert!(matches!(
            check_claim(&payment, trip_id, &seats(&["2A"]), 1_000),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            check_claim(&payment, Uuid::new_v4(), &seats(&["2A", "2B"]), 2_000),
            Err(AppError::InvalidRequest(_))
        ));
        // Trip repriced after the payment was made
        assert!(matches!(
            check_claim(&payment, trip_id, &seats(&["2A", "2B"]), 2_400),
            Err(AppError::PriceMismatch {
                expected: 2_400,
                provided: 2_000
            })
        ));
    }

    #[test]
    fn test_seat_sets_ignore_order() {
        let a = vec!["1A".to_string(), "1B".to_string()];
        let b = vec!["1B".to_string(), "1A".to_string()];
        let c = vec!["1A".to_string()];
        assert!(same_seats(&a, &b));
        assert!(!same_seats(&a, &c));
    }
}
