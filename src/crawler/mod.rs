//! Outbound request toolkit shared by every job
//!
//! Throttling, identity rotation, resilient fetching and the robots.txt
//! politeness cache, bundled into one [`Crawler`] handle that job bodies
//! clone.

pub mod fetcher;
pub mod identity;
pub mod robots;
pub mod throttle;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;

pub use fetcher::{FetchOptions, FetchResponse, ResilientFetcher};
pub use identity::Identity;
pub use robots::{PolitenessCache, RobotsTxt};
pub use throttle::Throttler;

/// Main crawler structure
///
/// Cheap to clone; all members are shared.
#[derive(Clone)]
pub struct Crawler {
    pub fetcher: Arc<ResilientFetcher>,
    pub politeness: Arc<PolitenessCache>,
    pub identity: Arc<Identity>,
    pub throttler: Throttler,
}

impl Crawler {
    /// Build every component from one validated configuration
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher =
            Arc::new(ResilientFetcher::from_config(config).context("Failed to create HTTP client")?);
        let politeness = Arc::new(PolitenessCache::from_config(Arc::clone(&fetcher), config));
        let identity = Arc::new(Identity::from_config(config)?);
        tracing::debug!(proxies = identity.proxy_count(), "Crawler ready");

        Ok(Self {
            fetcher,
            politeness,
            identity,
            throttler: Throttler::from_config(&config.scraping),
        })
    }

    /// Assemble from pre-built parts (tests, custom wiring)
    pub fn from_parts(
        fetcher: Arc<ResilientFetcher>,
        identity: Identity,
        throttler: Throttler,
        robots_timeout: std::time::Duration,
    ) -> Self {
        let politeness = Arc::new(PolitenessCache::new(Arc::clone(&fetcher), robots_timeout));
        Self {
            fetcher,
            politeness,
            identity: Arc::new(identity),
            throttler,
        }
    }
}
