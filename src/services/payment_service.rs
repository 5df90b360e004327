//! Mobile-money payment reconciliation.
//!
//! A payment starts `PENDING` when the passenger asks to pay by phone and is
//! resolved exactly once to `SUCCESSFUL` or `FAILED`. The provider may deliver
//! its callback zero, one or many times and in any order relative to client
//! polling, so resolution locks the row and treats anything but a `PENDING`
//! row as a harmless duplicate.
//!
//! Provider calls and notifications never run inside a transaction.
//!
//! Seats are not held while the passenger approves on their phone. When a
//! payment settles for seats that are no longer bookable, the amount is
//! refunded to the passenger's wallet in the same transaction.
//!
//! Lock order is payment, then trip, then wallet.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::{PgConnection, types::Json};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{Notification, NotificationKind},
        payment::{
            InitiateMomoRequest, InitiateMomoResponse, MomoStatus, PaymentStatusResponse,
            PendingPayment,
        },
        wallet::TransactionType,
    },
    services::{
        booking_service, ledger,
        momo_provider::{ChargeRequest, MomoProvider},
        notification_service::{self, Notifier},
        seat_inventory,
    },
};

/// What a callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The payment moved from `PENDING` to this terminal status.
    Resolved(MomoStatus),
    /// The payment was already terminal; nothing changed.
    AlreadyResolved(MomoStatus),
    /// No payment with that id exists.
    Unknown,
    /// The callback carried a non-terminal or unrecognised status.
    Ignored,
}

/// Normalize a payer phone number to digits only (`+250 788-123456` -> `250788123456`).
pub fn normalize_phone(phone: &str) -> Result<String, AppError> {
    let trimmed = phone.trim();
    let without_plus = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = without_plus
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    if !(9..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidRequest(
            "Phone number must contain 9 to 15 digits".to_string(),
        ));
    }
    Ok(digits)
}

/// Start a mobile-money payment for a booking intent.
///
/// # Process
///
/// 1. Validate the phone number and seat list
/// 2. Price the intent server-side and compare with the client total
/// 3. Store a `PENDING` payment under a fresh correlation id
/// 4. Return immediately; the provider request runs in a spawned task
///
/// If the provider rejects the request, the payment is resolved as `FAILED`
/// through the same path as a provider callback.
pub async fn initiate_momo_payment(
    pool: &DbPool,
    provider: &Arc<dyn MomoProvider>,
    notifier: &Arc<dyn Notifier>,
    user_id: Uuid,
    request: InitiateMomoRequest,
) -> Result<InitiateMomoResponse, AppError> {
    let phone_number = normalize_phone(&request.phone_number)?;
    let intent = request.booking;
    seat_inventory::validate_seat_request(&intent.seat_ids)?;

    // Advisory read: seats are only reserved when the booking itself commits
    let trip = seat_inventory::find_trip(pool, intent.trip_id).await?;
    seat_inventory::ensure_bookable(&trip)?;
    seat_inventory::check_seats(&trip, &intent.seat_ids)?;

    let amount_cents = booking_service::expected_total(trip.base_price_cents, intent.seat_ids.len())?;
    booking_service::verify_client_total(amount_cents, intent.total_price_cents)?;

    let external_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO pending_payments (
            user_id,
            external_transaction_id,
            phone_number,
            amount_cents,
            booking_payload,
            status
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(external_id)
    .bind(&phone_number)
    .bind(amount_cents)
    .bind(Json(&intent))
    .bind(MomoStatus::Pending.as_str())
    .execute(pool)
    .await?;

    tracing::info!(
        user_id = %user_id,
        external_id = %external_id,
        amount_cents,
        "Mobile-money payment initiated"
    );

    let charge = ChargeRequest {
        external_id,
        phone_number,
        amount_cents,
    };
    let pool = pool.clone();
    let provider = Arc::clone(provider);
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = provider.request_to_pay(&charge).await {
            tracing::warn!(external_id = %charge.external_id, error = %e, "Provider rejected charge");
            if let Err(e) =
                resolve_payment(&pool, &notifier, charge.external_id, MomoStatus::Failed).await
            {
                tracing::error!(
                    external_id = %charge.external_id,
                    error = %e,
                    "Failed to mark rejected payment as failed"
                );
            }
        }
    });

    Ok(InitiateMomoResponse {
        message: "Payment request sent. Check your phone to approve it.".to_string(),
        external_transaction_id: external_id,
    })
}

/// Handle a provider callback.
///
/// Never fails because of the callback's content: unknown ids, duplicate
/// deliveries and unrecognised statuses are logged and reported as outcomes.
/// Only database errors are returned as `Err`, so the provider retries.
pub async fn handle_momo_callback(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    external_id: &str,
    status: &str,
) -> Result<CallbackOutcome, AppError> {
    let Ok(external_id) = Uuid::parse_str(external_id.trim()) else {
        tracing::warn!(external_id, "Callback for malformed payment id ignored");
        return Ok(CallbackOutcome::Unknown);
    };

    let outcome = match MomoStatus::try_from(status.to_string()) {
        Ok(s) if s.is_terminal() => s,
        _ => {
            tracing::info!(external_id = %external_id, status, "Non-terminal callback ignored");
            return Ok(CallbackOutcome::Ignored);
        }
    };

    resolve_payment(pool, notifier, external_id, outcome).await
}

/// Move a `PENDING` payment to a terminal status, exactly once.
///
/// The notification is sent only after the new status is committed.
pub async fn resolve_payment(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    external_id: Uuid,
    outcome: MomoStatus,
) -> Result<CallbackOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let Some(payment) = lock_payment(&mut *tx, external_id).await? else {
        tracing::warn!(external_id = %external_id, "Callback for unknown payment ignored");
        return Ok(CallbackOutcome::Unknown);
    };

    if !payment.status.can_transition_to(outcome) {
        tracing::info!(
            external_id = %external_id,
            current = payment.status.as_str(),
            received = outcome.as_str(),
            "Duplicate callback ignored"
        );
        return Ok(CallbackOutcome::AlreadyResolved(payment.status));
    }

    sqlx::query(
        "UPDATE pending_payments SET status = $1, resolved_at = NOW() WHERE id = $2",
    )
    .bind(outcome.as_str())
    .bind(payment.id)
    .execute(&mut *tx)
    .await?;

    let refunded = outcome == MomoStatus::Successful
        && refund_if_unbookable(&mut *tx, &payment).await?;

    tx.commit().await?;

    tracing::info!(
        external_id = %external_id,
        user_id = %payment.user_id,
        status = outcome.as_str(),
        refunded,
        "Mobile-money payment resolved"
    );

    let notification = if refunded {
        refund_notification(&payment)
    } else {
        let kind = match outcome {
            MomoStatus::Successful => NotificationKind::PaymentSuccessful,
            _ => NotificationKind::PaymentFailed,
        };
        Notification::new(
            kind,
            payment.user_id,
            json!({
                "external_transaction_id": external_id,
                "amount_cents": payment.amount_cents,
                "booking": payment.booking_payload.0,
            }),
        )
    };
    notification_service::dispatch(notifier, notification);

    Ok(CallbackOutcome::Resolved(outcome))
}

/// Lock a payment row by its provider correlation id.
pub async fn lock_payment(
    conn: &mut PgConnection,
    external_id: Uuid,
) -> Result<Option<PendingPayment>, AppError> {
    let payment = sqlx::query_as::<_, PendingPayment>(
        "SELECT * FROM pending_payments WHERE external_transaction_id = $1 FOR UPDATE",
    )
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(payment)
}

/// Refund a settled payment whose seats can no longer be booked.
///
/// The caller holds the payment row lock, and the payment is `SUCCESSFUL` and
/// backs no booking. The intended trip is locked next; if it is gone, no
/// longer scheduled, or any paid-for seat is taken, `amount_cents` is credited
/// to the passenger's wallet as a `refund` row and the payment is marked
/// refunded so it can neither back a booking nor be refunded again.
///
/// Returns whether a refund was made.
pub async fn refund_if_unbookable(
    conn: &mut PgConnection,
    payment: &PendingPayment,
) -> Result<bool, AppError> {
    if payment.refunded_at.is_some() {
        return Ok(false);
    }

    let intent = &payment.booking_payload;
    let bookable = match seat_inventory::lock_trip(conn, intent.trip_id).await {
        Ok(trip) => seat_inventory::ensure_bookable(&trip)
            .and_then(|_| seat_inventory::check_seats(&trip, &intent.seat_ids))
            .is_ok(),
        Err(AppError::TripNotFound) => false,
        Err(e) => return Err(e),
    };
    if bookable {
        return Ok(false);
    }

    ledger::credit_wallet(
        conn,
        payment.user_id,
        payment.amount_cents,
        TransactionType::Refund,
        &format!(
            "Refund for mobile-money payment {}",
            payment.external_transaction_id
        ),
    )
    .await?;

    sqlx::query("UPDATE pending_payments SET refunded_at = NOW() WHERE id = $1")
        .bind(payment.id)
        .execute(&mut *conn)
        .await?;

    tracing::info!(
        external_id = %payment.external_transaction_id,
        user_id = %payment.user_id,
        amount_cents = payment.amount_cents,
        "Settled payment refunded, seats no longer bookable"
    );

    Ok(true)
}

pub fn refund_notification(payment: &PendingPayment) -> Notification {
    Notification::new(
        NotificationKind::PaymentRefunded,
        payment.user_id,
        json!({
            "external_transaction_id": payment.external_transaction_id,
            "refunded_cents": payment.amount_cents,
            "booking": payment.booking_payload.0,
        }),
    )
}

/// Status of one of the caller's payments, for client polling.
pub async fn get_payment_status(
    pool: &DbPool,
    user_id: Uuid,
    external_id: Uuid,
) -> Result<PaymentStatusResponse, AppError> {
    let payment = sqlx::query_as::<_, PendingPayment>(
        "SELECT * FROM pending_payments WHERE external_transaction_id = $1 AND user_id = $2",
    )
    .bind(external_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::PaymentNotFound)?;

    Ok(payment.into())
}

/// Fail every payment that has been `PENDING` for longer than `timeout`.
///
/// Goes through [`resolve_payment`] so a callback arriving at the same moment
/// still wins or loses cleanly. Returns how many payments were expired.
pub async fn expire_stale_payments(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    timeout: Duration,
) -> Result<usize, AppError> {
    let timeout = chrono::Duration::from_std(timeout)
        .map_err(|e| AppError::Internal(format!("Invalid payment timeout: {e}")))?;
    let cutoff = Utc::now() - timeout;

    let stale: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT external_transaction_id
        FROM pending_payments
        WHERE status = $1 AND created_at < $2
        ORDER BY created_at
        "#,
    )
    .bind(MomoStatus::Pending.as_str())
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut expired = 0;
    for external_id in stale {
        if let CallbackOutcome::Resolved(_) =
            resolve_payment(pool, notifier, external_id, MomoStatus::Failed).await?
        {
            expired += 1;
        }
    }

    Ok(expired)
}

/// Run [`expire_stale_payments`] every `every` until the runtime shuts down.
pub fn spawn_expiry_sweeper(
    pool: DbPool,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match expire_stale_payments(&pool, &notifier, timeout).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "Expired stale mobile-money payments"),
                Err(e) => tracing::error!(error = %e, "Payment expiry sweep failed"),
            }
        }
    })
}
