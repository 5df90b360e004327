//! Mobile-money provider client.
//!
//! The provider is an external dependency reached over HTTP. A charge request
//! is accepted with `202 Accepted` and the real outcome arrives later on the
//! callback endpoint, correlated by the `X-Reference-Id` we generate.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::{config::Config, error::AppError};

/// Largest minor-unit exponent among ISO 4217 currencies.
const MAX_CURRENCY_DECIMALS: u32 = 4;

/// A request to charge a phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub external_id: Uuid,
    /// Digits only, international format without `+`
    pub phone_number: String,
    /// Minor units of the configured currency
    pub amount_cents: i64,
}

#[async_trait]
pub trait MomoProvider: Send + Sync {
    /// Ask the provider to charge the payer. Returns once the request is accepted,
    /// not when the payer approves it.
    async fn request_to_pay(&self, charge: &ChargeRequest) -> Result<(), AppError>;
}

/// Collection API client (`POST /collection/v1_0/requesttopay`).
pub struct HttpMomoProvider {
    client: reqwest::Client,
    endpoint: Url,
    subscription_key: String,
    api_token: String,
    target_environment: String,
    currency: String,
    currency_decimals: u32,
    callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestToPayBody<'a> {
    amount: String,
    currency: &'a str,
    external_id: String,
    payer: Payer<'a>,
    payer_message: &'a str,
    payee_note: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Payer<'a> {
    party_id_type: &'static str,
    party_id: &'a str,
}

impl HttpMomoProvider {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `MOMO_BASE_URL` is not a valid URL, `MOMO_CURRENCY_DECIMALS`
    /// is larger than any currency uses, or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        if config.momo_currency_decimals > MAX_CURRENCY_DECIMALS {
            return Err(AppError::Internal(format!(
                "MOMO_CURRENCY_DECIMALS must be at most {MAX_CURRENCY_DECIMALS}, got {}",
                config.momo_currency_decimals
            )));
        }

        let base = Url::parse(&config.momo_base_url)
            .map_err(|e| AppError::Internal(format!("Invalid MOMO_BASE_URL: {e}")))?;
        let endpoint = base
            .join("collection/v1_0/requesttopay")
            .map_err(|e| AppError::Internal(format!("Invalid MOMO_BASE_URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            subscription_key: config.momo_subscription_key.clone(),
            api_token: config.momo_api_token.clone(),
            target_environment: config.momo_target_environment.clone(),
            currency: config.momo_currency.clone(),
            currency_decimals: config.momo_currency_decimals,
            callback_url: config.momo_callback_url.clone(),
        })
    }
}

/// Render minor units as the decimal string the provider expects.
///
/// `decimals` is the currency's minor-unit exponent: `(1234, 2)` is `"12.34"`,
/// while RWF has none and `(1234, 0)` is `"1234"`.
pub fn format_amount(amount: i64, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let sign = if amount < 0 { "-" } else { "" };
    let decimals = decimals as usize;
    let digits = format!("{:0width$}", amount.unsigned_abs(), width = decimals + 1);
    let (units, fraction) = digits.split_at(digits.len() - decimals);
    format!("{sign}{units}.{fraction}")
}

#[async_trait]
impl MomoProvider for HttpMomoProvider {
    async fn request_to_pay(&self, charge: &ChargeRequest) -> Result<(), AppError> {
        let body = RequestToPayBody {
            amount: format_amount(charge.amount_cents, self.currency_decimals),
            currency: &self.currency,
            external_id: charge.external_id.to_string(),
            payer: Payer {
                party_id_type: "MSISDN",
                party_id: &charge.phone_number,
            },
            payer_message: "Bus ticket payment",
            payee_note: "Bus ticket payment",
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_token)
            .header("X-Reference-Id", charge.external_id.to_string())
            .header("X-Target-Environment", &self.target_environment)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .json(&body);

        if let Some(callback_url) = &self.callback_url {
            request = request.header("X-Callback-Url", callback_url);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "requesttopay answered {status}: {detail}"
            )));
        }

        tracing::debug!(external_id = %charge.external_id, "Provider accepted charge request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(extra: &[(&str, &str)]) -> Config {
        let mut vars = vec![("DATABASE_URL".to_string(), "postgres://x".to_string())];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        envy::from_iter(vars).unwrap()
    }

    #[test]
    fn test_whole_unit_currency_has_no_decimal_point() {
        assert_eq!(format_amount(0, 0), "0");
        assert_eq!(format_amount(5_000, 0), "5000");
        assert_eq!(format_amount(-250, 0), "-250");
    }

    #[test]
    fn test_format_amount_with_minor_units() {
        assert_eq!(format_amount(0, 2), "0.00");
        assert_eq!(format_amount(5, 2), "0.05");
        assert_eq!(format_amount(123_456, 2), "1234.56");
        assert_eq!(format_amount(-250, 2), "-2.50");
        assert_eq!(format_amount(1_234, 3), "1.234");
    }

    #[test]
    fn test_currency_decimals_come_from_config() {
        let rwf = HttpMomoProvider::from_config(&config_with(&[])).unwrap();
        assert_eq!(rwf.currency, "RWF");
        assert_eq!(rwf.currency_decimals, 0);

        let eur = HttpMomoProvider::from_config(&config_with(&[
            ("MOMO_CURRENCY", "EUR"),
            ("MOMO_CURRENCY_DECIMALS", "2"),
        ]))
        .unwrap();
        assert_eq!(eur.currency_decimals, 2);

        assert!(HttpMomoProvider::from_config(&config_with(&[("MOMO_CURRENCY_DECIMALS", "9")])).is_err());
    }

    #[test]
    fn test_endpoint_is_joined_onto_base_url() {
        let config = config_with(&[("MOMO_BASE_URL", "https://provider.example/")]);

        let provider = HttpMomoProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.endpoint.as_str(),
            "https://provider.example/collection/v1_0/requesttopay"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = config_with(&[("MOMO_BASE_URL", "not a url")]);

        assert!(HttpMomoProvider::from_config(&config).is_err());
    }
}
