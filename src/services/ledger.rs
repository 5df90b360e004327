//! Ledger store - wallet balances and their append-only transaction log.
//!
//! The mutating primitives here never open or commit a transaction. They take
//! the connection of a transaction owned by the caller, so a booking, transfer
//! or deposit can combine several of them and commit once.
//!
//! # Invariants
//!
//! - A balance never goes below zero (checked here, backed by a CHECK constraint)
//! - Every balance change writes exactly one `wallet_transactions` row, so
//!   `SUM(amount_cents)` per wallet always equals `balance_cents`
//! - Wallet rows are locked with `FOR UPDATE` before a balance is checked, and
//!   several wallets are always locked in ascending wallet id order

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::wallet::{TransactionType, Wallet, WalletTransaction},
};

/// Result of a single ledger posting.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub wallet_id: Uuid,
    /// Balance after the posting
    pub balance_cents: i64,
    pub transaction: WalletTransaction,
}

/// Reject zero and negative amounts.
pub fn validate_amount(amount_cents: i64) -> Result<(), AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Balance left after removing `amount_cents`, or `InsufficientFunds`.
pub fn balance_after_debit(balance_cents: i64, amount_cents: i64) -> Result<i64, AppError> {
    balance_cents
        .checked_sub(amount_cents)
        .filter(|remaining| *remaining >= 0)
        .ok_or(AppError::InsufficientFunds)
}

/// Sort and deduplicate ids into the global lock order.
pub fn lock_order(wallet_ids: &[Uuid]) -> Vec<Uuid> {
    let mut ordered = wallet_ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}

/// Create the user's wallet if it does not exist yet and return its id.
pub async fn ensure_wallet(conn: &mut PgConnection, user_id: Uuid) -> Result<Uuid, AppError> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let wallet_id: Uuid = sqlx::query_scalar("SELECT id FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(wallet_id)
}

/// Lock a user's wallet row for the rest of the transaction.
///
/// Returns `None` when the user has no wallet yet.
pub async fn lock_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Wallet>, AppError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance_cents, created_at, updated_at
        FROM wallets
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(wallet)
}

/// Ensure and lock the wallets of several users in ascending wallet id order.
///
/// Two operations touching the same pair of wallets from opposite directions
/// (A pays B while B pays A) acquire the locks in the same order and cannot
/// deadlock. The returned wallets are in lock order.
pub async fn lock_wallets_in_order(
    conn: &mut PgConnection,
    user_ids: &[Uuid],
) -> Result<Vec<Wallet>, AppError> {
    // Missing wallets are created in user id order too
    let mut wallet_ids = Vec::with_capacity(user_ids.len());
    for user_id in lock_order(user_ids) {
        wallet_ids.push(ensure_wallet(conn, user_id).await?);
    }

    let mut locked = Vec::with_capacity(wallet_ids.len());
    for wallet_id in lock_order(&wallet_ids) {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance_cents, created_at, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *conn)
        .await?;
        locked.push(wallet);
    }

    Ok(locked)
}

/// Add money to a user's wallet, creating the wallet on first credit.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `Internal`: `kind` is a debit type
pub async fn credit_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount_cents: i64,
    kind: TransactionType,
    description: &str,
) -> Result<LedgerEntry, AppError> {
    validate_amount(amount_cents)?;
    if !kind.is_credit() {
        return Err(AppError::Internal(format!(
            "{} cannot be posted as a credit",
            kind.as_str()
        )));
    }

    ensure_wallet(conn, user_id).await?;

    // UPDATE takes the row lock itself
    let (wallet_id, balance_cents): (Uuid, i64) = sqlx::query_as(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents + $1,
            updated_at = NOW()
        WHERE user_id = $2
        RETURNING id, balance_cents
        "#,
    )
    .bind(amount_cents)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let transaction = record_transaction(conn, wallet_id, amount_cents, kind, description).await?;

    Ok(LedgerEntry {
        wallet_id,
        balance_cents,
        transaction,
    })
}

/// Remove money from a user's wallet.
///
/// A user without a wallet has a zero balance, so debiting them fails with
/// `InsufficientFunds` rather than `NotFound`.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `InsufficientFunds`: the balance would go negative
/// - `Internal`: `kind` is a credit type
pub async fn debit_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount_cents: i64,
    kind: TransactionType,
    description: &str,
) -> Result<LedgerEntry, AppError> {
    validate_amount(amount_cents)?;
    if kind.is_credit() {
        return Err(AppError::Internal(format!(
            "{} cannot be posted as a debit",
            kind.as_str()
        )));
    }

    let wallet = lock_wallet(conn, user_id)
        .await?
        .ok_or(AppError::InsufficientFunds)?;

    let remaining = balance_after_debit(wallet.balance_cents, amount_cents)?;

    sqlx::query(
        r#"
        UPDATE wallets
        SET balance_cents = $1,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(remaining)
    .bind(wallet.id)
    .execute(&mut *conn)
    .await?;

    let transaction =
        record_transaction(conn, wallet.id, -amount_cents, kind, description).await?;

    Ok(LedgerEntry {
        wallet_id: wallet.id,
        balance_cents: remaining,
        transaction,
    })
}

async fn record_transaction(
    conn: &mut PgConnection,
    wallet_id: Uuid,
    signed_amount_cents: i64,
    kind: TransactionType,
    description: &str,
) -> Result<WalletTransaction, AppError> {
    let transaction = sqlx::query_as::<_, WalletTransaction>(
        r#"
        INSERT INTO wallet_transactions (wallet_id, amount_cents, transaction_type, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id, wallet_id, amount_cents, transaction_type, description, created_at
        "#,
    )
    .bind(wallet_id)
    .bind(signed_amount_cents)
    .bind(kind.as_str())
    .bind(description)
    .fetch_one(&mut *conn)
    .await?;

    Ok(transaction)
}

/// Read a user's wallet without locking it.
pub async fn wallet_for_user(pool: &DbPool, user_id: Uuid) -> Result<Option<Wallet>, AppError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT id, user_id, balance_cents, created_at, updated_at FROM wallets WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(wallet)
}

/// Most recent ledger rows of a user's wallet, newest first.
pub async fn list_transactions(
    pool: &DbPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<WalletTransaction>, AppError> {
    let rows = sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT t.id, t.wallet_id, t.amount_cents, t.transaction_type, t.description, t.created_at
        FROM wallet_transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE w.user_id = $1
        ORDER BY t.created_at DESC, t.id
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sum of all ledger rows of a wallet. Equal to its balance when the ledger is consistent.
pub async fn ledger_sum(pool: &DbPool, wallet_id: Uuid) -> Result<i64, AppError> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM wallet_transactions WHERE wallet_id = $1",
    )
    .bind(wallet_id)
    .fetch_one(pool)
    .await?;

    Ok(sum)
}
