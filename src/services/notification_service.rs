//! Best-effort notification delivery.
//!
//! Notifications are dispatched only after the database transaction that
//! produced them has committed. Delivery runs in a spawned task; a failure is
//! logged and never reaches the financial operation that triggered it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::services::signing::generate_signature;

/// Delivery channel for user notifications (push relay, socket gateway, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Posts notifications to a push relay as signed JSON.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Notification-Signature: sha256=<hex>`
/// - `X-Notification-Id: <uuid>`
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookNotifier {
    /// 5 second timeout per delivery so a slow relay cannot pile up tasks.
    pub fn new(url: String, secret: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        let body = serde_json::to_vec(notification)
            .map_err(|e| AppError::Internal(format!("Failed to serialize notification: {e}")))?;
        let signature = generate_signature(&self.secret, &body)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Notification-Signature", signature)
            .header("X-Notification-Id", notification.event_id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Notification request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Notification relay answered {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Used when no relay is configured: notifications only show up in the logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        tracing::info!(
            user_id = %notification.user_id,
            event_id = %notification.event_id,
            event_type = ?notification.event_type,
            "Notification"
        );
        Ok(())
    }
}

/// Fire-and-forget delivery. Must only be called after commit.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                user_id = %notification.user_id,
                event_id = %notification.event_id,
                error = %e,
                "Failed to deliver notification"
            );
        }
    });
}
