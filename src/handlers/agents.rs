//! Agent HTTP handlers.

use axum::{Extension, Json, extract::State};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        user::Role,
        wallet::{DepositRequest, DepositResponse},
    },
    services::wallet_service,
    state::AppState,
};

/// Deposit cash into a passenger's wallet.
///
/// # Endpoint
///
/// `POST /api/v1/agent/deposits`
///
/// # Request Body
///
/// ```json
/// { "passenger_serial": "PS-4821", "amount_cents": 1000000 }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "deposited_amount_cents": 1000000, "commission_cents": 25000 }
/// ```
pub async fn create_deposit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    // Cheap early reject; the service re-checks the role from the database
    if auth.role != Role::Agent {
        return Err(AppError::Forbidden);
    }

    let response =
        wallet_service::deposit_for_passenger(&state.pool, &state.notifier, auth.user_id, request)
            .await?;
    Ok(Json(response))
}
