//! Wallet HTTP handlers.
//!
//! - GET /api/v1/wallet - Current balance
//! - GET /api/v1/wallet/transactions - Ledger history
//! - POST /api/v1/wallet/topup - Credit own wallet
//! - POST /api/v1/wallet/transfer - Send money by serial code
//! - POST /api/v1/wallet/pin - Set or change the wallet PIN

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::wallet::{
        BalanceResponse, SetPinRequest, TopUpRequest, TransactionListQuery, TransferRequest,
        TransferResponse, WalletResponse, WalletTransaction,
    },
    services::wallet_service,
    state::AppState,
};

pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet(&state.pool, auth.user_id).await?;
    Ok(Json(wallet))
}

/// `GET /api/v1/wallet/transactions?limit=20`
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<Vec<WalletTransaction>>, AppError> {
    let rows = wallet_service::list_transactions(&state.pool, auth.user_id, query.limit).await?;
    Ok(Json(rows))
}

/// Credit the caller's wallet.
///
/// # Request Body
///
/// ```json
/// { "amount_cents": 500000 }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "balance_cents": 750000 }
/// ```
pub async fn top_up(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance_cents =
        wallet_service::top_up(&state.pool, auth.user_id, request.amount_cents).await?;
    Ok(Json(BalanceResponse { balance_cents }))
}

/// Transfer money to another user.
///
/// # Errors
///
/// - 401 `invalid_pin`
/// - 404 `recipient_not_found`
/// - 422 `insufficient_balance` / `pin_not_set`
pub async fn transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let response =
        wallet_service::transfer(&state.pool, &state.notifier, auth.user_id, request).await?;
    Ok(Json(response))
}

/// Returns 204 No Content on success.
pub async fn set_pin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SetPinRequest>,
) -> Result<StatusCode, AppError> {
    wallet_service::set_pin(&state.pool, auth.user_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
