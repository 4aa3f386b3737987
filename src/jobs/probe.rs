//! Generic probe job: one polite, resilient fetch of a source's entry URL

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::Config;
use crate::crawler::{Crawler, FetchOptions};
use crate::scheduler::{Job, JobDescriptor, JobOutcome};

/// Fetches one URL through the full politeness/identity/retry stack
pub struct ProbeJob {
    name: String,
    url: String,
    crawler: Crawler,
}

impl ProbeJob {
    pub fn new(name: impl Into<String>, url: impl Into<String>, crawler: Crawler) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            crawler,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Job for ProbeJob {
    #[instrument(skip(self), fields(job = %self.name, url = %self.url))]
    async fn run(&self) -> anyhow::Result<JobOutcome> {
        let (user_agent, proxy) = self.crawler.identity.random_pair();

        if !self.crawler.politeness.is_allowed(&self.url, &user_agent).await {
            return Ok(JobOutcome::SkippedRobots);
        }

        // Honour Crawl-delay when it exceeds the random delay
        let crawl_delay = self
            .crawler
            .politeness
            .crawl_delay(&self.url, &user_agent)
            .await
            .unwrap_or(Duration::ZERO);
        let wait = self.crawler.throttler.sample().max(crawl_delay);
        tokio::time::sleep(wait).await;

        let options = FetchOptions::new().user_agent(user_agent).proxy(proxy);
        let response = self
            .crawler
            .fetcher
            .fetch(Method::GET, &self.url, options)
            .await
            .with_context(|| format!("Probe of {} failed", self.url))?;

        info!(
            status = response.status,
            bytes = response.body.len(),
            waited_secs = wait.as_secs_f64(),
            "Probe fetched"
        );
        Ok(JobOutcome::Completed)
    }
}

/// One probe job per `[scrapers.<name>]` table that sets a `url`
///
/// Enabled flags and intervals are applied later by
/// [`JobRegistry::apply_config`](crate::scheduler::JobRegistry::apply_config).
pub fn build_probe_jobs(config: &Config, crawler: &Crawler) -> Vec<JobDescriptor> {
    config
        .scrapers
        .iter()
        .filter_map(|(name, over)| {
            let url = over.url.as_deref()?;
            Some(JobDescriptor::from_async(
                name.clone(),
                ProbeJob::new(name.clone(), url, crawler.clone()),
            ))
        })
        .collect()
}
