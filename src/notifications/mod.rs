//! Notifications for new opportunities and health alerts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────┐
//! │   OpportunityStore       │   │  HealthMonitor   │
//! │   (new rows only)        │   │  (stale jobs)    │
//! └────────────┬─────────────┘   └────────┬─────────┘
//!              └──────────────┬───────────┘
//!                             ▼
//!                  ┌────────────────────┐
//!                  │     Dispatcher     │
//!                  │  concurrent fan-out│
//!                  └─────────┬──────────┘
//!                ┌───────────┴───────────┐
//!                ▼                       ▼
//!          ┌───────────┐          ┌────────────┐
//!          │  Webhook  │          │  Telegram  │
//!          └───────────┘          └────────────┘
//! ```

pub mod channels;
mod dispatcher;

use serde::{Deserialize, Serialize};

pub use channels::telegram::TelegramChannel;
pub use channels::webhook::WebhookChannel;
pub use channels::{Channel, ChannelError, DeliveryStatus};
pub use dispatcher::Dispatcher;

/// One event to deliver: a new opportunity or a health alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub source: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

impl Notification {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
        }
    }

    /// One-line subject, as used for email and chat headers
    pub fn subject(&self) -> String {
        format!("New Gig Found on {}: {}", self.source, self.title)
    }

    /// Plain-text body
    pub fn body(&self) -> String {
        format!(
            "Source: {}\nTitle: {}\nLink: {}\n\n{}",
            self.source, self.title, self.link, self.snippet
        )
    }
}
