//! Telegram bot notification channel

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Notification;
use crate::utils::truncate_text;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// sendMessage rejects texts longer than this
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,
    /// Target chat id (user, group or channel)
    pub chat_id: String,
    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    TELEGRAM_API.to_string()
}

fn default_timeout() -> u64 {
    10
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }

    /// Point at a different Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bot_token.trim().is_empty() {
            return Err("Telegram bot token cannot be empty".to_string());
        }
        if self.chat_id.trim().is_empty() {
            return Err("Telegram chat id cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Sends notifications with the Bot API `sendMessage` method
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

fn message_text(notification: &Notification) -> String {
    truncate_text(
        &format!("{}\n{}", notification.subject(), notification.body()),
        MAX_MESSAGE_CHARS,
    )
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        let payload = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": message_text(notification),
            "disable_web_page_preview": true,
        });

        let response = self.client.post(self.endpoint()).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ChannelError::from_status(status, body));
        }

        let parsed: SendMessageResponse = serde_json::from_str(&body)?;
        if !parsed.ok {
            return Err(ChannelError::Other(
                parsed
                    .description
                    .unwrap_or_else(|| "sendMessage returned ok=false".to_string()),
            ));
        }

        let message_id = parsed.result.map(|m| m.message_id).unwrap_or_default();
        tracing::info!(chat_id = %self.config.chat_id, message_id = message_id, "Telegram message sent");
        Ok(DeliveryStatus::success_with_message(
            "telegram",
            format!("message {message_id}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(TelegramConfig::new("123:abc", "42").validate().is_ok());
        assert!(TelegramConfig::new("", "42").validate().is_err());
        assert!(TelegramConfig::new("123:abc", " ").validate().is_err());
    }

    #[test]
    fn test_long_snippet_truncated() {
        let n = Notification::new("Jiji", "Website", "https://jiji.ug/1", "x".repeat(5000));
        let text = message_text(&n);
        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);
        assert!(text.ends_with("..."));
        assert!(text.starts_with("New Gig Found on Jiji: Website\n"));
    }

    #[test]
    fn test_endpoint() {
        let channel = TelegramChannel::new(
            TelegramConfig::new("123:abc", "42").with_api_base("http://127.0.0.1:9999/"),
        )
        .unwrap();
        assert_eq!(
            channel.endpoint(),
            "http://127.0.0.1:9999/bot123:abc/sendMessage"
        );
    }
}
