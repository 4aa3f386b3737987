//! Proxy and User-Agent rotation
//!
//! Pools are loaded once from configuration and never mutated.

use rand::seq::SliceRandom;

use crate::config::Config;

/// Used when the configured User-Agent pool is empty
pub const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Read-only proxy and User-Agent pools
#[derive(Debug, Clone, Default)]
pub struct Identity {
    use_proxies: bool,
    proxies: Vec<String>,
    user_agents: Vec<String>,
}

impl Identity {
    pub fn new(use_proxies: bool, proxies: Vec<String>, user_agents: Vec<String>) -> Self {
        Self {
            use_proxies,
            proxies,
            user_agents,
        }
    }

    /// Build pools from configuration, including the optional proxies file
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let proxies = config.load_proxies()?;
        tracing::debug!(
            proxies = proxies.len(),
            user_agents = config.scraping.user_agents.len(),
            use_proxies = config.scraping.use_proxies,
            "Identity pools loaded"
        );
        Ok(Self::new(
            config.scraping.use_proxies,
            proxies,
            config.scraping.user_agents.clone(),
        ))
    }

    /// A random proxy, or `None` when proxies are disabled or none are configured
    pub fn pick_proxy(&self) -> Option<&str> {
        if !self.use_proxies {
            return None;
        }
        self.proxies
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    /// A random User-Agent, or the fallback when the pool is empty
    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    /// One User-Agent and one optional proxy for a request
    pub fn random_pair(&self) -> (String, Option<String>) {
        (
            self.pick_user_agent().to_string(),
            self.pick_proxy().map(str::to_string),
        )
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}
