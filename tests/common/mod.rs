//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gigscout::crawler::{Crawler, Identity, ResilientFetcher, Throttler};
use gigscout::notifications::channels::{Channel, ChannelError, ChannelResult};
use gigscout::notifications::{DeliveryStatus, Notification};
use gigscout::scheduler::Lifecycle;
use gigscout::storage::SqliteRepository;
use gigscout::utils::retry::RetryConfig;

/// Fetcher with fast retries: `attempts` total, 10ms backoff
pub fn fast_fetcher(attempts: u32) -> Arc<ResilientFetcher> {
    let retry = RetryConfig::with_delays(attempts, 10, 20);
    Arc::new(ResilientFetcher::new(Duration::from_secs(5), retry).unwrap())
}

/// Crawler that never throttles and rotates nothing
pub fn test_crawler(attempts: u32) -> Crawler {
    Crawler::from_parts(
        fast_fetcher(attempts),
        Identity::new(false, Vec::new(), vec!["GigscoutTest/1.0".to_string()]),
        Throttler::disabled(),
        Duration::from_secs(2),
    )
}

pub fn memory_repo() -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::in_memory().unwrap())
}

pub fn test_lifecycle(repo: &Arc<SqliteRepository>) -> Lifecycle {
    Lifecycle::new(repo.clone(), repo.clone(), 2)
}

/// Channel that records every notification it receives
#[derive(Default)]
pub struct RecordingChannel {
    name: String,
    fail: bool,
    received: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Channel that records, then reports a failure
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            ..Default::default()
        })
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        self.received.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(ChannelError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(DeliveryStatus::success(self.name.clone()))
    }
}
