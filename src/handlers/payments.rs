//! Mobile-money HTTP handlers.
//!
//! - POST /api/v1/payments/momo - Start a phone payment (authenticated)
//! - GET /api/v1/payments/momo/:external_id - Poll its status (authenticated)
//! - POST /api/v1/payments/momo/callback - Provider callback (public)

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::payment::{
        InitiateMomoRequest, InitiateMomoResponse, MomoCallback, PaymentStatusResponse,
    },
    services::{
        payment_service::{self, CallbackOutcome},
        signing,
    },
    state::AppState,
};

/// Start a mobile-money payment.
///
/// Returns 202 Accepted right away; the passenger approves on their phone and
/// the result arrives through the callback.
pub async fn initiate_momo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InitiateMomoRequest>,
) -> Result<(StatusCode, Json<InitiateMomoResponse>), AppError> {
    let response = payment_service::initiate_momo_payment(
        &state.pool,
        &state.momo,
        &state.notifier,
        auth.user_id,
        request,
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn get_momo_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(external_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let status = payment_service::get_payment_status(&state.pool, auth.user_id, external_id).await?;
    Ok(Json(status))
}

/// Provider callback.
///
/// # Headers
///
/// `X-Callback-Signature: sha256=<hex>` over the raw body. Only a deployment
/// started with `MOMO_ALLOW_UNSIGNED_CALLBACKS=true` and no secret skips it.
///
/// # Response
///
/// Always 200 for well-formed callbacks, including duplicates and unknown
/// ids, so the provider stops retrying. Only storage failures answer 5xx.
pub async fn momo_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackOutcome>, AppError> {
    match state.config.callback_secret() {
        Some(secret) => {
            let signature = headers
                .get("X-Callback-Signature")
                .and_then(|h| h.to_str().ok())
                .ok_or(AppError::InvalidSignature)?;
            if !signing::verify_signature(secret, &body, signature) {
                return Err(AppError::InvalidSignature);
            }
        }
        None if state.config.momo_allow_unsigned_callbacks => {}
        // Startup refuses this configuration; never trust an unsigned callback
        None => return Err(AppError::InvalidSignature),
    }

    let callback: MomoCallback = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed callback: {e}")))?;

    let outcome = payment_service::handle_momo_callback(
        &state.pool,
        &state.notifier,
        &callback.external_id,
        &callback.status,
    )
    .await?;

    Ok(Json(outcome))
}
