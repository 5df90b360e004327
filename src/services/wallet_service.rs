//! Wallet operations - top-up, peer transfer, agent deposit and PIN management.
//!
//! Each balance-changing operation is one database transaction composed from
//! the ledger primitives. Input problems (non-positive amount, malformed PIN,
//! blank serial) and PIN verification are handled before the transaction
//! opens, so they never hold a wallet lock.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        notification::{Notification, NotificationKind},
        user::{Role, User},
        wallet::{
            DepositRequest, DepositResponse, SetPinRequest, TransactionType, TransferRequest,
            TransferResponse, WalletResponse, WalletTransaction,
        },
    },
    services::{
        ledger,
        notification_service::{self, Notifier},
    },
};

const PIN_LENGTH: usize = 4;
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

/// A wallet PIN is exactly four ASCII digits.
pub fn validate_pin_format(pin: &str) -> Result<(), AppError> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidRequest(
            "PIN must be exactly 4 digits".to_string(),
        ));
    }
    Ok(())
}

/// Agent commission for a deposit, rounded down to the minor unit.
///
/// `rate_bps` is in basis points: 250 means 2.5%.
pub fn compute_commission(amount_cents: i64, rate_bps: i32) -> Result<i64, AppError> {
    if !(0..=10_000).contains(&rate_bps) {
        return Err(AppError::Internal(format!(
            "Commission rate {rate_bps} bps is out of range"
        )));
    }
    let commission = i128::from(amount_cents) * i128::from(rate_bps) / 10_000;
    i64::try_from(commission).map_err(|_| AppError::InvalidRequest("Amount too large".to_string()))
}

fn normalize_serial(serial: &str) -> Result<String, AppError> {
    let serial = serial.trim();
    if serial.is_empty() {
        return Err(AppError::InvalidRequest(
            "Serial code is required".to_string(),
        ));
    }
    Ok(serial.to_ascii_uppercase())
}

pub fn hash_pin(pin: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash PIN: {e}")))
}

pub fn verify_pin(pin: &str, stored_hash: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("Stored PIN hash is invalid: {e}")))?;
    Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidPin)
}

/// Argon2 is deliberately slow; keep it off the async worker threads.
async fn verify_pin_blocking(pin: String, stored_hash: String) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || verify_pin(&pin, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("PIN verification task failed: {e}")))?
}

async fn load_user(pool: &DbPool, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(
        "SELECT id, full_name, role, serial_code, pin_hash, commission_rate_bps FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Unauthorized)
}

async fn find_user_by_serial(pool: &DbPool, serial: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, full_name, role, serial_code, pin_hash, commission_rate_bps FROM users WHERE serial_code = $1",
    )
    .bind(serial)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Current balance of the user's wallet (zero when no wallet exists yet).
pub async fn get_wallet(pool: &DbPool, user_id: Uuid) -> Result<WalletResponse, AppError> {
    Ok(ledger::wallet_for_user(pool, user_id).await?.into())
}

/// Recent ledger rows, newest first. `limit` defaults to 50 and is capped at 200.
pub async fn list_transactions(
    pool: &DbPool,
    user_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<WalletTransaction>, AppError> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    ledger::list_transactions(pool, user_id, limit).await
}

/// Credit the user's own wallet.
///
/// # Returns
///
/// The balance after the credit.
pub async fn top_up(pool: &DbPool, user_id: Uuid, amount_cents: i64) -> Result<i64, AppError> {
    ledger::validate_amount(amount_cents)?;

    let mut tx = pool.begin().await?;
    let entry = ledger::credit_wallet(
        &mut *tx,
        user_id,
        amount_cents,
        TransactionType::Deposit,
        "Wallet top-up",
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, amount_cents, "Wallet topped up");
    Ok(entry.balance_cents)
}

/// Move money from the sender to the user holding `recipient_serial`.
///
/// # Process
///
/// 1. Validate amount, PIN format and serial (no transaction yet)
/// 2. Verify the PIN against the stored hash
/// 3. Resolve the recipient; reject unknown recipients and self-transfers
/// 4. Lock both wallets in ascending wallet id order
/// 5. Check the sender's balance, debit sender, credit recipient, commit
/// 6. Notify the recipient after commit
///
/// # Errors
///
/// - `InvalidRequest`: bad amount, PIN format, serial, or self-transfer
/// - `PinNotSet` / `InvalidPin`: PIN check failed
/// - `RecipientNotFound`: no user with that serial
/// - `InsufficientFunds`: sender balance below amount
pub async fn transfer(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    sender_id: Uuid,
    request: TransferRequest,
) -> Result<TransferResponse, AppError> {
    ledger::validate_amount(request.amount_cents)?;
    validate_pin_format(&request.pin)?;
    let serial = normalize_serial(&request.recipient_serial)?;

    let sender = load_user(pool, sender_id).await?;
    let pin_hash = sender.pin_hash.clone().ok_or(AppError::PinNotSet)?;
    verify_pin_blocking(request.pin, pin_hash).await?;

    let recipient = find_user_by_serial(pool, &serial)
        .await?
        .ok_or(AppError::RecipientNotFound)?;
    if recipient.id == sender.id {
        return Err(AppError::InvalidRequest(
            "Cannot transfer to your own wallet".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let wallets = ledger::lock_wallets_in_order(&mut *tx, &[sender.id, recipient.id]).await?;
    let sender_balance = wallets
        .iter()
        .find(|w| w.user_id == sender.id)
        .map(|w| w.balance_cents)
        .unwrap_or(0);
    if sender_balance < request.amount_cents {
        // Dropping the transaction rolls back the wallet rows it may have created
        return Err(AppError::InsufficientFunds);
    }

    let debit = ledger::debit_wallet(
        &mut *tx,
        sender.id,
        request.amount_cents,
        TransactionType::TransferOut,
        &format!("Transfer to {}", recipient.serial_code),
    )
    .await?;
    ledger::credit_wallet(
        &mut *tx,
        recipient.id,
        request.amount_cents,
        TransactionType::TransferIn,
        &format!("Transfer from {}", sender.serial_code),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        sender_id = %sender.id,
        recipient_id = %recipient.id,
        amount_cents = request.amount_cents,
        "Wallet transfer completed"
    );

    notification_service::dispatch(
        notifier,
        Notification::new(
            NotificationKind::TransferReceived,
            recipient.id,
            json!({
                "amount_cents": request.amount_cents,
                "from": sender.full_name,
                "from_serial": sender.serial_code,
            }),
        ),
    );

    Ok(TransferResponse {
        new_sender_balance_cents: debit.balance_cents,
    })
}

/// Agent deposits cash into a passenger wallet and earns a commission.
///
/// The passenger credit, the commission credit and both ledger rows commit
/// together. The commission goes through the same `credit_wallet` path as any
/// other credit, creating the agent's wallet on first use.
///
/// # Errors
///
/// - `Forbidden`: caller is not an agent
/// - `RecipientNotFound`: no passenger with that serial. Agents, including the
///   caller, are never deposit recipients.
/// - `InvalidRequest`: bad amount or serial
pub async fn deposit_for_passenger(
    pool: &DbPool,
    notifier: &Arc<dyn Notifier>,
    agent_id: Uuid,
    request: DepositRequest,
) -> Result<DepositResponse, AppError> {
    ledger::validate_amount(request.amount_cents)?;
    let serial = normalize_serial(&request.passenger_serial)?;

    let agent = load_user(pool, agent_id).await?;
    if agent.role != Role::Agent {
        return Err(AppError::Forbidden);
    }

    let passenger = find_user_by_serial(pool, &serial)
        .await?
        .filter(|user| user.role == Role::Passenger)
        .ok_or(AppError::RecipientNotFound)?;

    let commission_cents = compute_commission(request.amount_cents, agent.commission_rate_bps)?;

    let mut tx = pool.begin().await?;

    ledger::lock_wallets_in_order(&mut *tx, &[passenger.id, agent.id]).await?;

    ledger::credit_wallet(
        &mut *tx,
        passenger.id,
        request.amount_cents,
        TransactionType::Deposit,
        &format!("Deposit by agent {}", agent.serial_code),
    )
    .await?;

    if commission_cents > 0 {
        ledger::credit_wallet(
            &mut *tx,
            agent.id,
            commission_cents,
            TransactionType::Commission,
            &format!("Commission on deposit for {}", passenger.serial_code),
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        agent_id = %agent.id,
        passenger_id = %passenger.id,
        amount_cents = request.amount_cents,
        commission_cents,
        "Agent deposit completed"
    );

    notification_service::dispatch(
        notifier,
        Notification::new(
            NotificationKind::DepositReceived,
            passenger.id,
            json!({
                "amount_cents": request.amount_cents,
                "agent_serial": agent.serial_code,
            }),
        ),
    );

    Ok(DepositResponse {
        deposited_amount_cents: request.amount_cents,
        commission_cents,
    })
}

/// Set the wallet PIN, or change it when `current_pin` matches the existing one.
///
/// Fails with `InvalidPin` if the PIN changed after it was verified.
pub async fn set_pin(pool: &DbPool, user_id: Uuid, request: SetPinRequest) -> Result<(), AppError> {
    validate_pin_format(&request.new_pin)?;

    let previous_hash = load_user(pool, user_id).await?.pin_hash;
    if let Some(existing) = &previous_hash {
        let current = request.current_pin.ok_or_else(|| {
            AppError::InvalidRequest("current_pin is required to change the PIN".to_string())
        })?;
        validate_pin_format(&current)?;
        verify_pin_blocking(current, existing.clone()).await?;
    }

    let new_pin = request.new_pin;
    let hash = tokio::task::spawn_blocking(move || hash_pin(&new_pin))
        .await
        .map_err(|e| AppError::Internal(format!("PIN hashing task failed: {e}")))??;

    // Only replaces the hash that was verified above; a concurrent change wins
    let updated = sqlx::query(
        "UPDATE users SET pin_hash = $1 WHERE id = $2 AND pin_hash IS NOT DISTINCT FROM $3",
    )
    .bind(hash)
    .bind(user_id)
    .bind(previous_hash)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::InvalidPin);
    }

    tracing::info!(user_id = %user_id, "Wallet PIN updated");
    Ok(())
}
