//! gigscout - polite, resilient scraper orchestration
//!
//! Runs many independent opportunity-collection jobs on their own
//! intervals, with uniform timing, failure isolation, robots.txt politeness,
//! bounded retries, deduplicated storage and alerting.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration loading and validation
//! - [`scheduler`] - Job registry, lifecycle wrapper and interval scheduler
//! - [`crawler`] - Throttling, identity rotation, fetching and robots.txt
//! - [`storage`] - SQLite ledgers, deduplicating store and export
//! - [`notifications`] - Channel fan-out for new opportunities and alerts
//! - [`health`] - Staleness monitor over the health ledger
//! - [`jobs`] - Built-in job bodies
//! - [`metrics`] - Prometheus counters and histograms
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gigscout::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let repo = Arc::new(SqliteRepository::new(&config.database.sqlite_path)?);
//!     let lifecycle = Arc::new(Lifecycle::from_config(repo.clone(), repo, &config.scheduler));
//!
//!     let mut scheduler = Scheduler::new(lifecycle, &config.scheduler);
//!     scheduler.register(JobDescriptor::from_async_fn("heartbeat", || async {
//!         Ok(JobOutcome::Completed)
//!     }))?;
//!     scheduler.start()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod health;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{Crawler, FetchOptions, PolitenessCache, ResilientFetcher};
    pub use crate::error::{Error, ErrorCategory, GigscoutErrorTrait, Result};
    pub use crate::health::HealthMonitor;
    pub use crate::models::{NewOpportunity, Opportunity, RunRecord, RunStatus};
    pub use crate::notifications::{Dispatcher, Notification};
    pub use crate::scheduler::{
        BlockingJob, Job, JobDescriptor, JobOutcome, Lifecycle, Scheduler,
    };
    pub use crate::storage::{OpportunityStore, SaveOutcome, SqliteRepository};
}

// Direct re-exports for convenience
pub use models::{NewOpportunity, Opportunity, RunStatus};
