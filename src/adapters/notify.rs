//! Alert delivery
//!
//! The staleness monitor hands finished messages to a [`Notifier`]. The
//! webhook notifier posts JSON; the log notifier only emits a warning event.

use crate::domain::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    text: &'a str,
}

/// Posts `{"subject": ..., "text": ...}` to a webhook URL
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Notification(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                subject,
                text: message,
            })
            .send()
            .await
            .map_err(|e| SyncError::Notification(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Notification(format!(
                "Webhook returned {}: {body}",
                status.as_u16()
            )));
        }

        tracing::info!(subject = subject, "Alert notification sent");
        Ok(())
    }
}

/// Writes alerts to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<()> {
        tracing::warn!(subject = subject, message = message, "Alert");
        Ok(())
    }
}

/// Picks the webhook notifier when a URL is configured
pub fn notifier_for(webhook_url: Option<&str>) -> Result<Box<dyn Notifier>> {
    match webhook_url {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}
