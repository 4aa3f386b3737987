//! robots.txt parsing and the per-domain politeness cache
//!
//! Each domain's robots.txt is fetched at most once per process. A failed
//! fetch caches "no policy", which allows everything.

use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::crawler::fetcher::{FetchOptions, ResilientFetcher};
use crate::metrics;
use crate::utils::{extract_netloc, path_and_query};

/// Parsed robots.txt rules
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent token (lowercase)
    rules: HashMap<String, AgentRules>,

    /// Rules for `*`
    default_rules: AgentRules,

    /// Sitemaps listed
    sitemaps: Vec<String>,
}

/// Rules for one user-agent group
#[derive(Debug, Clone, Default)]
pub struct AgentRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

impl AgentRules {
    fn merge(&mut self, other: &AgentRules) {
        self.disallow.extend(other.disallow.iter().cloned());
        self.allow.extend(other.allow.iter().cloned());
        if self.crawl_delay.is_none() {
            self.crawl_delay = other.crawl_delay;
        }
    }
}

impl RobotsTxt {
    /// Parse robots.txt content
    ///
    /// Unknown directives and malformed lines are ignored.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        let mut saw_rule = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if saw_rule {
                        robots.store_group(&current_agents, &current_rules);
                        current_agents.clear();
                        current_rules = AgentRules::default();
                        saw_rule = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    saw_rule = true;
                    if !value.is_empty() {
                        current_rules.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    saw_rule = true;
                    if !value.is_empty() {
                        current_rules.allow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    saw_rule = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current_rules.crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => robots.sitemaps.push(value.to_string()),
                _ => {}
            }
        }

        robots.store_group(&current_agents, &current_rules);
        robots
    }

    fn store_group(&mut self, agents: &[String], rules: &AgentRules) {
        for agent in agents {
            if agent == "*" {
                self.default_rules.merge(rules);
            } else {
                self.rules.entry(agent.clone()).or_default().merge(rules);
            }
        }
    }

    /// Rules that apply to a user-agent: exact token, then the longest
    /// token contained in the UA string, then `*`
    fn rules_for(&self, user_agent: &str) -> &AgentRules {
        let agent_lower = user_agent.to_lowercase();
        let product = agent_lower.split('/').next().unwrap_or("").trim();

        self.rules
            .get(product)
            .or_else(|| {
                self.rules
                    .iter()
                    .filter(|(token, _)| agent_lower.contains(token.as_str()))
                    .max_by_key(|(token, _)| token.len())
                    .map(|(_, rules)| rules)
            })
            .unwrap_or(&self.default_rules)
    }

    /// Check if a path is allowed for a user-agent
    ///
    /// The longest matching rule wins; on a tie, allow wins.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let rules = self.rules_for(user_agent);

        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| rule_matches(p, path))
                .map(|p| p.len())
                .max()
        };

        match (longest(&rules.allow), longest(&rules.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    /// Crawl delay for a user-agent
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules_for(user_agent)
            .crawl_delay
            .or(self.default_rules.crawl_delay)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Listed sitemaps
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Check if robots.txt disallows all crawling
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

/// Prefix match with `*` wildcards and an optional trailing `$` anchor
fn rule_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }

    let rest: Vec<&str> = parts.collect();
    let mut pos = first.len();
    if rest.is_empty() {
        return !anchored || pos == path.len();
    }

    for (i, part) in rest.iter().enumerate() {
        if anchored && i == rest.len() - 1 {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    true
}

type PolicySlot = Arc<OnceCell<Option<Arc<RobotsTxt>>>>;

/// Per-domain robots.txt cache, fail-open
///
/// Keyed by `host[:port]`. Entries never expire. Concurrent lookups for the
/// same domain share a single fetch.
pub struct PolitenessCache {
    fetcher: Arc<ResilientFetcher>,
    timeout: Duration,
    policies: Mutex<HashMap<String, PolicySlot>>,
}

impl PolitenessCache {
    pub fn new(fetcher: Arc<ResilientFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            policies: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(fetcher: Arc<ResilientFetcher>, config: &Config) -> Self {
        Self::new(fetcher, config.robots_timeout())
    }

    /// Whether `user_agent` may fetch `url`
    ///
    /// Returns true when the domain has no usable robots.txt.
    pub async fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let Some(robots) = self.policy(url).await else {
            return true;
        };

        let path = match path_and_query(url) {
            Ok(path) => path,
            Err(_) => return true,
        };

        let allowed = robots.is_allowed(user_agent, &path);
        if !allowed {
            warn!(url = %url, user_agent = %user_agent, "URL disallowed by robots.txt");
        }
        allowed
    }

    /// Crawl-delay declared for `user_agent` on the URL's domain
    pub async fn crawl_delay(&self, url: &str, user_agent: &str) -> Option<Duration> {
        self.policy(url)
            .await
            .and_then(|robots| robots.crawl_delay(user_agent))
    }

    /// Number of domains with a cached entry (including fail-open ones)
    pub fn cached_domains(&self) -> usize {
        self.policies.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Cached policy for the URL's domain, fetching it on first use
    pub async fn policy(&self, url: &str) -> Option<Arc<RobotsTxt>> {
        let netloc = match extract_netloc(url) {
            Ok(netloc) => netloc,
            Err(e) => {
                warn!(url = %url, error = %e, "Cannot derive domain, assuming allowed");
                return None;
            }
        };

        let slot = {
            let mut policies = match self.policies.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(policies.entry(netloc.clone()).or_default())
        };

        slot.get_or_init(|| self.load(&netloc)).await.clone()
    }

    async fn load(&self, netloc: &str) -> Option<Arc<RobotsTxt>> {
        let robots_url = format!("http://{netloc}/robots.txt");
        info!(url = %robots_url, "Fetching robots.txt");

        let options = FetchOptions::new().timeout(self.timeout);
        match self.fetcher.fetch(Method::GET, &robots_url, options).await {
            Ok(response) => {
                let robots = RobotsTxt::parse(&response.body);
                metrics::record_robots_fetch("ok");
                info!(domain = %netloc, "Parsed robots.txt");
                Some(Arc::new(robots))
            }
            Err(e) => {
                metrics::record_robots_fetch("failed");
                warn!(
                    domain = %netloc,
                    error = %e,
                    "Could not fetch robots.txt, assuming full access"
                );
                None
            }
        }
    }
}
