//! Webhook notification channel
//!
//! Posts each notification as a JSON document. Chat integrations that accept
//! incoming webhooks and automation hooks both fit here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Notification;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retries after the first attempt on 5xx, 429 or transport failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds, doubled per retry
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set retry budget and first backoff delay
    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.max_retries + 1,
            self.retry_delay_ms,
            self.retry_delay_ms.saturating_mul(8),
        )
    }
}

/// Webhook notification channel
///
/// # Payload Format
///
/// ```json
/// {
///   "source": "Reddit",
///   "title": "Hiring dev",
///   "link": "http://x/1",
///   "snippet": "snip",
///   "subject": "New Gig Found on Reddit: Hiring dev",
///   "sent_at": "2024-01-01T12:00:00Z"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "source": notification.source,
            "title": notification.title,
            "link": notification.link,
            "snippet": notification.snippet,
            "subject": notification.subject(),
            "sent_at": chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn post_once(&self, payload: &serde_json::Value) -> ChannelResult<u16> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(ChannelError::from_status(status, body))
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(notification);

        let status = with_retry_if(
            &self.config.retry_config(),
            || self.post_once(&payload),
            ChannelError::is_recoverable,
        )
        .await?;

        tracing::info!(url = %self.config.url, status = status, "Webhook delivered");
        Ok(DeliveryStatus::success_with_message(
            "webhook",
            format!("Delivered to {}", self.config.url),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_validation() {
        assert!(WebhookConfig::new("https://example.com/webhook")
            .validate()
            .is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("example.com/webhook").validate().is_err());
        assert!(WebhookConfig::new("https://example.com")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_webhook_from_url() {
        let channel = WebhookChannel::from_url("https://example.com/alerts").unwrap();
        assert_eq!(channel.name(), "webhook");
        assert_eq!(channel.url(), "https://example.com/alerts");

        assert!(WebhookChannel::from_url("not-a-url").is_err());
    }

    #[test]
    fn test_webhook_payload_building() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        let notification = Notification::new("Reddit", "Hiring dev", "http://x/1", "snip");

        let payload = channel.build_payload(&notification);

        assert_eq!(payload["source"], "Reddit");
        assert_eq!(payload["link"], "http://x/1");
        assert_eq!(payload["subject"], "New Gig Found on Reddit: Hiring dev");
        assert!(payload["sent_at"].is_string());
    }

    #[test]
    fn test_webhook_config_defaults_from_toml() {
        let config: WebhookConfig = toml::from_str(r#"url = "https://hooks.example.com/x""#).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_config().max_attempts, 4);
    }
}
