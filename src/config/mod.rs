//! Configuration management for gigscout
//!
//! Configuration is loaded once at startup (TOML file, then `GIGSCOUT_*`
//! environment overrides), validated, and handed to each component's
//! constructor. Nothing reads configuration through global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::notifications::channels::telegram::TelegramConfig;
use crate::notifications::channels::webhook::WebhookConfig;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound request behaviour shared by every job
    pub scraping: ScrapingConfig,

    /// Trigger loop and lifecycle settings
    pub scheduler: SchedulerConfig,

    /// Health monitor settings
    pub health: HealthConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Notification channels
    pub notifications: NotificationsConfig,

    /// Periodic export
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-job nested overrides, keyed by job name
    pub scrapers: BTreeMap<String, ScraperOverride>,
}

/// Outbound request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Job names that are allowed to run
    pub enabled_scrapers: Vec<String>,

    /// Randomized inter-request delay, `[min, max]` seconds
    pub delay_range: [f64; 2],

    /// Total attempts per request, including the first
    pub retry_attempts: u32,

    /// First backoff delay in milliseconds
    pub retry_min_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub retry_max_delay_ms: u64,

    /// Default request timeout in seconds
    pub http_timeout_secs: u64,

    /// Timeout for robots.txt lookups in seconds
    pub robots_timeout_secs: u64,

    /// Route requests through a random proxy
    pub use_proxies: bool,

    /// Proxy URLs
    pub proxies: Vec<String>,

    /// Optional file with one proxy per line
    pub proxies_file: Option<PathBuf>,

    /// User-Agent pool
    pub user_agents: Vec<String>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval for jobs without an explicit one
    pub default_interval_secs: u64,

    /// Fire every job once immediately on start
    pub run_on_start: bool,

    /// Size of the worker pool for blocking job bodies
    pub blocking_workers: usize,

    /// How long shutdown waits for in-flight jobs before aborting them
    pub drain_timeout_secs: u64,

    /// Consecutive failures before a job's circuit opens (0 disables)
    pub circuit_breaker_threshold: u32,

    /// How long an open circuit rejects runs
    pub circuit_breaker_cooldown_secs: u64,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// How often the monitor runs
    pub check_interval_minutes: u64,

    /// A job is unhealthy when its last success is older than this
    pub threshold_minutes: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Notification channel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Generic JSON webhook (chat integrations, automation hooks)
    pub webhook: Option<WebhookConfig>,

    /// Telegram bot
    pub telegram: Option<TelegramConfig>,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Schedule a recurring export
    pub enabled: bool,

    /// Interval between exports
    pub interval_minutes: u64,

    /// Directory the export files are written to
    pub output_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Directory for timestamped log files; console only when unset
    pub log_dir: Option<PathBuf>,
}

/// Per-job overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperOverride {
    /// Force-enable or disable the job
    pub enabled: Option<bool>,

    /// Trigger interval in seconds
    pub interval_secs: Option<u64>,

    /// Entry URL for probe-style jobs
    pub url: Option<String>,

    /// Free-form job settings (cities, countries, max_pages, ...)
    pub settings: toml::Table,
}

impl ScraperOverride {
    /// Integer setting, e.g. `max_pages`
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.settings
            .get(key)
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
    }

    /// String list setting, e.g. `cities`
    pub fn setting_strings(&self, key: &str) -> Option<Vec<String>> {
        self.settings.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }
}

/// Validation failures
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("delay_range must satisfy 0 <= min <= max, got [{min}, {max}]")]
    InvalidDelayRange { min: f64, max: f64 },

    #[error("{field} must be greater than 0")]
    MustBePositive { field: &'static str },

    #[error("retry_min_delay_ms ({min}) exceeds retry_max_delay_ms ({max})")]
    InvalidBackoff { min: u64, max: u64 },

    #[error("invalid log format '{0}', expected text or json")]
    InvalidLogFormat(String),

    #[error("invalid notification config: {0}")]
    Notification(String),
}

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            enabled_scrapers: Vec::new(),
            delay_range: [2.0, 5.0],
            retry_attempts: 3,
            retry_min_delay_ms: 4_000,
            retry_max_delay_ms: 10_000,
            http_timeout_secs: 15,
            robots_timeout_secs: 5,
            use_proxies: false,
            proxies: Vec::new(),
            proxies_file: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 3600,
            run_on_start: true,
            blocking_workers: 4,
            drain_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_secs: 1800,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
            threshold_minutes: 180,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/gigs.db"),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 1440,
            output_dir: PathBuf::from("exports"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
            log_dir: Some(PathBuf::from("logs")),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load from an optional file, apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override individual values from `GIGSCOUT_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(list) = env_list("GIGSCOUT_ENABLED_SCRAPERS") {
            self.scraping.enabled_scrapers = list;
        }
        if let Some(min) = env_parse::<f64>("GIGSCOUT_DELAY_MIN") {
            self.scraping.delay_range[0] = min;
        }
        if let Some(max) = env_parse::<f64>("GIGSCOUT_DELAY_MAX") {
            self.scraping.delay_range[1] = max;
        }
        if let Some(attempts) = env_parse("GIGSCOUT_RETRY_ATTEMPTS") {
            self.scraping.retry_attempts = attempts;
        }
        if let Some(timeout) = env_parse("GIGSCOUT_HTTP_TIMEOUT") {
            self.scraping.http_timeout_secs = timeout;
        }
        if let Ok(value) = std::env::var("GIGSCOUT_USE_PROXIES") {
            self.scraping.use_proxies = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        if let Some(list) = env_list("GIGSCOUT_PROXIES") {
            self.scraping.proxies = list;
        }
        if let Ok(path) = std::env::var("GIGSCOUT_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(path);
        }
        if let Some(minutes) = env_parse("GIGSCOUT_HEALTH_THRESHOLD_MINUTES") {
            self.health.threshold_minutes = minutes;
        }
        if let Ok(level) = std::env::var("GIGSCOUT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GIGSCOUT_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(url) = std::env::var("GIGSCOUT_WEBHOOK_URL") {
            self.notifications.webhook = Some(WebhookConfig::new(url));
        }
        if let (Ok(token), Ok(chat_id)) = (
            std::env::var("TELEGRAM_BOT_TOKEN"),
            std::env::var("TELEGRAM_CHAT_ID"),
        ) {
            self.notifications.telegram = Some(TelegramConfig::new(token, chat_id));
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [min, max] = self.scraping.delay_range;
        if !(min >= 0.0 && min <= max && max.is_finite()) {
            return Err(ConfigError::InvalidDelayRange { min, max });
        }

        let positive = [
            ("retry_attempts", u64::from(self.scraping.retry_attempts)),
            ("http_timeout_secs", self.scraping.http_timeout_secs),
            ("robots_timeout_secs", self.scraping.robots_timeout_secs),
            ("default_interval_secs", self.scheduler.default_interval_secs),
            ("blocking_workers", self.scheduler.blocking_workers as u64),
            ("check_interval_minutes", self.health.check_interval_minutes),
            ("threshold_minutes", self.health.threshold_minutes),
            ("export.interval_minutes", self.export.interval_minutes),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::MustBePositive { field });
        }

        if self.scraping.retry_min_delay_ms > self.scraping.retry_max_delay_ms {
            return Err(ConfigError::InvalidBackoff {
                min: self.scraping.retry_min_delay_ms,
                max: self.scraping.retry_max_delay_ms,
            });
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidLogFormat(self.logging.format.clone()));
        }

        if let Some(webhook) = &self.notifications.webhook {
            webhook.validate().map_err(ConfigError::Notification)?;
        }

        if self.scrapers.values().any(|s| s.interval_secs == Some(0)) {
            return Err(ConfigError::MustBePositive {
                field: "scrapers.*.interval_secs",
            });
        }

        if self.scraping.use_proxies
            && self.scraping.proxies.is_empty()
            && self.scraping.proxies_file.is_none()
        {
            tracing::warn!("use_proxies is set but no proxies are configured; requests go direct");
        }

        Ok(())
    }

    /// Default request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping.http_timeout_secs)
    }

    /// robots.txt lookup timeout as Duration
    #[must_use]
    pub fn robots_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping.robots_timeout_secs)
    }

    /// Retry policy for the resilient fetcher
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.scraping.retry_attempts,
            self.scraping.retry_min_delay_ms,
            self.scraping.retry_max_delay_ms,
        )
    }

    /// Whether a job is listed in `enabled_scrapers` and not disabled by override
    ///
    /// An override can only switch a listed job off; `enabled = true` on an
    /// unlisted job leaves it disabled.
    pub fn is_job_enabled(&self, name: &str) -> bool {
        let listed = self.scraping.enabled_scrapers.iter().any(|s| s == name);
        listed
            && self
                .scrapers
                .get(name)
                .and_then(|o| o.enabled)
                .unwrap_or(true)
    }

    /// Period of the health check loop
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        minutes(self.health.check_interval_minutes)
    }

    /// Period of the export loop
    #[must_use]
    pub fn export_interval(&self) -> Duration {
        minutes(self.export.interval_minutes)
    }

    /// Interval for a job: its override, else the scheduler default
    pub fn interval_for(&self, name: &str) -> Duration {
        let secs = self
            .scrapers
            .get(name)
            .and_then(|o| o.interval_secs)
            .unwrap_or(self.scheduler.default_interval_secs);
        Duration::from_secs(secs)
    }

    /// Proxy pool: the inline list plus the optional proxies file
    pub fn load_proxies(&self) -> Result<Vec<String>> {
        let mut proxies = self.scraping.proxies.clone();

        if let Some(path) = &self.scraping.proxies_file {
            match std::fs::read_to_string(path) {
                Ok(content) => proxies.extend(parse_proxy_list(&content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "Proxy file not found");
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read proxy file: {}", path.display())
                    })
                }
            }
        }

        Ok(proxies)
    }
}

/// Parse a proxy list file: one entry per line, blanks and `#` comments skipped
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_delay_range() {
        let mut config = Config::default();
        config.scraping.delay_range = [5.0, 1.0];
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDelayRange { min: 5.0, max: 1.0 })
        );
    }

    #[test]
    fn test_zero_retry_attempts() {
        let mut config = Config::default();
        config.scraping.retry_attempts = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MustBePositive {
                field: "retry_attempts"
            })
        );
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.robots_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_job_enabled_and_interval() {
        let mut config = Config::default();
        config.scraping.enabled_scrapers = vec!["jiji".into(), "reddit".into()];
        config.scrapers.insert(
            "reddit".into(),
            ScraperOverride {
                enabled: Some(false),
                interval_secs: Some(600),
                ..Default::default()
            },
        );

        assert!(config.is_job_enabled("jiji"));
        assert!(!config.is_job_enabled("reddit"));
        assert!(!config.is_job_enabled("gumtree"));

        config.scrapers.insert(
            "gumtree".into(),
            ScraperOverride {
                enabled: Some(true),
                ..Default::default()
            },
        );
        assert!(!config.is_job_enabled("gumtree"), "override cannot enable an unlisted job");

        assert_eq!(config.interval_for("reddit"), Duration::from_secs(600));
        assert_eq!(config.interval_for("jiji"), Duration::from_secs(3600));
    }

    #[test]
    fn test_loop_intervals_saturate() {
        let mut config = Config::default();
        assert_eq!(config.health_check_interval(), Duration::from_secs(3600));
        assert_eq!(config.export_interval(), Duration::from_secs(1440 * 60));

        config.health.check_interval_minutes = u64::MAX;
        config.export.interval_minutes = u64::MAX / 2;
        assert_eq!(config.health_check_interval(), Duration::from_secs(u64::MAX));
        assert_eq!(config.export_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_parse_proxy_list() {
        let content = "# comment\nhttp://a:1\n\n  http://b:2  \n#http://c:3\n";
        assert_eq!(parse_proxy_list(content), vec!["http://a:1", "http://b:2"]);
    }

    #[test]
    fn test_scraper_settings() {
        let raw = r#"
            [scrapers.craigslist]
            interval_secs = 900
            [scrapers.craigslist.settings]
            cities = ["sfbay", "newyork"]
            max_pages = 2
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        let craigslist = &config.scrapers["craigslist"];

        assert_eq!(craigslist.interval_secs, Some(900));
        assert_eq!(craigslist.setting_u64("max_pages"), Some(2));
        assert_eq!(
            craigslist.setting_strings("cities"),
            Some(vec!["sfbay".to_string(), "newyork".to_string()])
        );
        assert_eq!(craigslist.setting_u64("missing"), None);
    }
}
