//! Fan-out dispatcher over the enabled channels

use futures::future::join_all;
use std::sync::Arc;

use super::channels::telegram::TelegramChannel;
use super::channels::webhook::WebhookChannel;
use super::channels::{Channel, ChannelResult, DeliveryStatus};
use super::Notification;
use crate::config::NotificationsConfig;
use crate::metrics;

/// Delivers each notification to every channel concurrently
///
/// A channel failure is logged and reported in the returned statuses; it
/// never reaches the caller as an error and never stops sibling channels.
#[derive(Default, Clone)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn Channel>>,
}

impl Dispatcher {
    /// Dispatcher with no channels (every notify is a no-op)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the channels enabled in configuration
    pub fn from_config(config: &NotificationsConfig) -> ChannelResult<Self> {
        let mut dispatcher = Self::new();

        if let Some(webhook) = &config.webhook {
            dispatcher.add_channel(Arc::new(WebhookChannel::new(webhook.clone())?));
        }
        if let Some(telegram) = &config.telegram {
            dispatcher.add_channel(Arc::new(TelegramChannel::new(telegram.clone())?));
        }

        tracing::info!(channels = ?dispatcher.channel_names(), "Notification dispatcher ready");
        Ok(dispatcher)
    }

    /// Add a notification channel
    pub fn add_channel(&mut self, channel: Arc<dyn Channel>) {
        self.channels.push(channel);
    }

    /// Builder-style [`add_channel`](Self::add_channel)
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to every channel; one status per channel, in registration order
    pub async fn notify(&self, notification: &Notification) -> Vec<DeliveryStatus> {
        if self.channels.is_empty() {
            tracing::debug!(link = %notification.link, "No notification channels enabled");
            return Vec::new();
        }

        let deliveries = self.channels.iter().map(|channel| async move {
            let name = channel.name().to_string();
            let status = match channel.send(notification).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(
                        channel = %name,
                        link = %notification.link,
                        error = %e,
                        "Notification delivery failed"
                    );
                    DeliveryStatus::failure(name.clone(), e.to_string())
                }
            };
            metrics::record_notification(&name, status.success);
            status
        });

        join_all(deliveries).await
    }
}
