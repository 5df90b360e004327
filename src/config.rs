//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 10
/// - `MOMO_*`: mobile-money provider settings
/// - `MOMO_CALLBACK_SECRET` (required): verifies `X-Callback-Signature`, unless
///   `MOMO_ALLOW_UNSIGNED_CALLBACKS=true` is set for local development
/// - `MOMO_CURRENCY_DECIMALS` (optional): minor-unit digits of `MOMO_CURRENCY`,
///   defaults to 0 (RWF has no minor unit)
/// - `NOTIFICATION_WEBHOOK_URL` / `NOTIFICATION_SECRET` (optional): push relay
/// - `PAYMENT_TIMEOUT_SECS` / `PAYMENT_SWEEP_INTERVAL_SECS`: pending payment expiry
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    /// Base URL of the provider's collection API, e.g. `https://sandbox.momodeveloper.mtn.com/`
    #[serde(default = "default_momo_base_url")]
    pub momo_base_url: String,

    #[serde(default)]
    pub momo_subscription_key: String,

    /// Bearer token for the collection API
    #[serde(default)]
    pub momo_api_token: String,

    #[serde(default = "default_momo_environment")]
    pub momo_target_environment: String,

    #[serde(default = "default_currency")]
    pub momo_currency: String,

    /// How many of the stored minor units make up the currency's decimal
    /// part when amounts are sent to the provider
    #[serde(default)]
    pub momo_currency_decimals: u32,

    /// Where the provider should deliver asynchronous payment results
    pub momo_callback_url: Option<String>,

    /// Shared secret for `X-Callback-Signature`
    pub momo_callback_secret: Option<String>,

    /// Accept unsigned callbacks when no secret is configured. Never set in production.
    #[serde(default)]
    pub momo_allow_unsigned_callbacks: bool,

    /// Push relay endpoint. Notifications are only logged when unset.
    pub notification_webhook_url: Option<String>,

    #[serde(default)]
    pub notification_secret: String,

    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub payment_sweep_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    10
}

fn default_momo_base_url() -> String {
    "https://sandbox.momodeveloper.mtn.com/".to_string()
}

fn default_momo_environment() -> String {
    "sandbox".to_string()
}

fn default_currency() -> String {
    "RWF".to_string()
}

fn default_payment_timeout() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

/// Settings that parse but are unsafe to run with.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MOMO_CALLBACK_SECRET must be set (or MOMO_ALLOW_UNSIGNED_CALLBACKS=true for local testing)")]
    MissingCallbackSecret,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Reject settings the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callback_secret().is_none() && !self.momo_allow_unsigned_callbacks {
            return Err(ConfigError::MissingCallbackSecret);
        }
        Ok(())
    }

    /// The callback signing secret, if one is set and not blank.
    pub fn callback_secret(&self) -> Option<&str> {
        self.momo_callback_secret
            .as_deref()
            .filter(|secret| !secret.trim().is_empty())
    }

    /// How long a mobile-money payment may stay `PENDING` before the sweeper fails it.
    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn payment_sweep_interval(&self) -> Duration {
        // tokio's interval panics on a zero period
        Duration::from_secs(self.payment_sweep_interval_secs.max(1))
    }
}
