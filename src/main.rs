//! Bus wallet core - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Wire the notifier and mobile-money provider
//! 5. Start the pending-payment expiry sweeper
//! 6. Build HTTP router and start server on configured port

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use bus_wallet_core::{
    app, config, db,
    services::{
        momo_provider::{HttpMomoProvider, MomoProvider},
        notification_service::{LogNotifier, Notifier, WebhookNotifier},
        payment_service,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    config.validate()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let notifier: Arc<dyn Notifier> = match &config.notification_webhook_url {
        Some(url) => {
            url::Url::parse(url)?;
            tracing::info!(%url, "Notifications delivered to push relay");
            Arc::new(WebhookNotifier::new(
                url.clone(),
                config.notification_secret.clone(),
            )?)
        }
        None => {
            tracing::warn!("NOTIFICATION_WEBHOOK_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let momo: Arc<dyn MomoProvider> = Arc::new(HttpMomoProvider::from_config(&config)?);

    if config.callback_secret().is_none() {
        tracing::warn!(
            "MOMO_ALLOW_UNSIGNED_CALLBACKS is set, payment callbacks are accepted without a signature"
        );
    }

    // Fails payments whose callback never arrived
    payment_service::spawn_expiry_sweeper(
        pool.clone(),
        Arc::clone(&notifier),
        config.payment_timeout(),
        config.payment_sweep_interval(),
    );

    let addr = format!("0.0.0.0:{}", config.server_port);

    let state = AppState {
        pool,
        config: Arc::new(config),
        notifier,
        momo,
    };
    let app = app::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
