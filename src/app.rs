//! HTTP router.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Build the application router.
///
/// Everything under `/api/v1` except the provider callback requires a bearer token.
pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        // Booking routes
        .route("/api/v1/bookings", post(handlers::bookings::create_booking))
        .route(
            "/api/v1/bookings/{id}",
            get(handlers::bookings::get_booking),
        )
        .route(
            "/api/v1/bookings/{id}/cancel",
            post(handlers::bookings::cancel_booking),
        )
        // Wallet routes
        .route("/api/v1/wallet", get(handlers::wallet::get_wallet))
        .route(
            "/api/v1/wallet/transactions",
            get(handlers::wallet::list_transactions),
        )
        .route("/api/v1/wallet/topup", post(handlers::wallet::top_up))
        .route("/api/v1/wallet/transfer", post(handlers::wallet::transfer))
        .route("/api/v1/wallet/pin", post(handlers::wallet::set_pin))
        // Agent routes
        .route(
            "/api/v1/agent/deposits",
            post(handlers::agents::create_deposit),
        )
        // Mobile-money routes
        .route(
            "/api/v1/payments/momo",
            post(handlers::payments::initiate_momo),
        )
        .route(
            "/api/v1/payments/momo/{external_id}",
            get(handlers::payments::get_momo_status),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/payments/momo/callback",
            post(handlers::payments::momo_callback),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
