//! Wallet data models and API request/response types.
//!
//! This module defines:
//! - `Wallet`: one stored-value balance per user
//! - `WalletTransaction`: immutable ledger rows whose sum is the balance
//! - Request/response bodies for top-up, transfer, agent deposit and PIN setup

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Represents a wallet record from the database.
///
/// Balances are stored as `i64` minor currency units to avoid floating-point
/// precision issues. The `balance_cents >= 0` CHECK constraint backs the
/// no-negative-balance rule enforced by the ledger.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,

    /// Owner of this wallet (1:1)
    pub user_id: Uuid,

    pub balance_cents: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Kind of ledger movement.
///
/// The sign of the stored amount follows from the kind: credits are positive,
/// `TransferOut` and `BookingDebit` are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Commission,
    TransferIn,
    TransferOut,
    BookingDebit,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Commission => "commission",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::BookingDebit => "booking_debit",
            TransactionType::Refund => "refund",
        }
    }

    /// Whether this kind adds money to the wallet.
    pub fn is_credit(&self) -> bool {
        !matches!(
            self,
            TransactionType::TransferOut | TransactionType::BookingDebit
        )
    }
}

impl TryFrom<String> for TransactionType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "commission" => Ok(TransactionType::Commission),
            "transfer_in" => Ok(TransactionType::TransferIn),
            "transfer_out" => Ok(TransactionType::TransferOut),
            "booking_debit" => Ok(TransactionType::BookingDebit),
            "refund" => Ok(TransactionType::Refund),
            _ => Err(UnknownVariant {
                kind: "transaction type",
                value,
            }),
        }
    }
}

/// Immutable append-only ledger row.
///
/// `amount_cents` is signed: positive for credits, negative for debits.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount_cents: i64,
    #[sqlx(try_from = "String")]
    pub transaction_type: TransactionType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Response body for `GET /api/v1/wallet`.
///
/// Users that never received a credit have no wallet row yet; they are shown
/// a zero balance.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet_id: Option<Uuid>,
    pub balance_cents: i64,
}

impl From<Option<Wallet>> for WalletResponse {
    fn from(wallet: Option<Wallet>) -> Self {
        match wallet {
            Some(w) => Self {
                wallet_id: Some(w.id),
                balance_cents: w.balance_cents,
            },
            None => Self {
                wallet_id: None,
                balance_cents: 0,
            },
        }
    }
}

/// Query string for `GET /api/v1/wallet/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub limit: Option<i64>,
}

/// Request to add money to the caller's own wallet.
///
/// ```json
/// { "amount_cents": 500000 }
/// ```
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount_cents: i64,
}

/// Balance after a credit or debit.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
}

/// Request to send money to another user identified by serial code.
///
/// ```json
/// {
///   "recipient_serial": "PS-4821",
///   "amount_cents": 250000,
///   "pin": "1234"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub recipient_serial: String,
    pub amount_cents: i64,
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub new_sender_balance_cents: i64,
}

/// Agent request to credit a passenger's wallet with cash received over the counter.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub passenger_serial: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DepositResponse {
    pub deposited_amount_cents: i64,
    pub commission_cents: i64,
}

/// Set or change the wallet PIN. `current_pin` is required when a PIN already exists.
#[derive(Debug, Deserialize)]
pub struct SetPinRequest {
    pub new_pin: String,
    pub current_pin: Option<String>,
}
