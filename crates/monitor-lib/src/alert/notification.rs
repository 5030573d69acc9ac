//! Outbound notification channels
//!
//! The dispatcher only needs `send(recipient, text)`. The webhook channel
//! speaks to a WhatsApp-style messaging gateway; the log channel is used
//! when no gateway is configured.

use crate::config::NotificationConfig;
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Trait for message delivery implementations
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver `text` to `recipient`
    async fn send(&self, recipient: &str, text: &str) -> MonitorResult<()>;

    /// Channel name for logs
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

/// Posts messages as JSON to a messaging gateway
pub struct WebhookChannel {
    client: Client,
    url: Url,
    api_key: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> MonitorResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| MonitorError::config(format!("invalid webhook url '{}': {}", url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, recipient: &str, text: &str) -> MonitorResult<()> {
        let mut request = self.client.post(self.url.clone()).json(&SendTextRequest {
            number: recipient,
            text,
        });
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MonitorError::delivery(recipient, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::delivery(
                recipient,
                format!("gateway returned {}: {}", status, body),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Writes alerts to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, recipient: &str, text: &str) -> MonitorResult<()> {
        info!(event = "notification_logged", recipient = %recipient, text = %text, "Alert notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the channel described by configuration
pub fn channel_from_config(
    config: &NotificationConfig,
) -> MonitorResult<std::sync::Arc<dyn NotificationChannel>> {
    match &config.webhook_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.timeout_secs.max(1));
            let channel = WebhookChannel::new(url, config.api_key.clone(), timeout)?;
            Ok(std::sync::Arc::new(channel))
        }
        None => Ok(std::sync::Arc::new(LogChannel)),
    }
}
