//! Tests for configuration loading

use serial_test::serial;
use std::path::Path;
use std::time::Duration;

use gigscout::config::{Config, ConfigError};
use gigscout::error::Error;

fn example_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.toml")
}

#[test]
fn test_example_config_parses_and_validates() {
    let config = Config::from_file(&example_path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.scraping.enabled_scrapers, ["reddit", "jiji", "gumtree"]);
    assert_eq!(config.scraping.delay_range, [2.0, 5.0]);
    assert_eq!(config.scheduler.circuit_breaker_threshold, 5);
    assert!(config.notifications.webhook.is_none());
}

#[test]
fn test_per_job_overrides() {
    let config = Config::from_file(&example_path()).unwrap();

    assert!(config.is_job_enabled("reddit"));
    assert!(config.is_job_enabled("jiji"));
    assert!(!config.is_job_enabled("gumtree"), "override disables a listed job");
    assert!(!config.is_job_enabled("craigslist"));

    assert_eq!(config.interval_for("reddit"), Duration::from_secs(1800));
    assert_eq!(config.interval_for("jiji"), Duration::from_secs(3600));

    let jiji = &config.scrapers["jiji"];
    assert_eq!(jiji.setting_u64("max_pages"), Some(3));
    assert_eq!(
        config.scrapers["gumtree"].setting_strings("cities").unwrap(),
        ["london", "manchester"]
    );
}

#[test]
fn test_partial_file_uses_defaults() {
    let config: Config = toml::from_str(
        r#"
        [scraping]
        enabled_scrapers = ["reddit"]
        "#,
    )
    .unwrap();

    assert_eq!(config.scraping.retry_attempts, 3);
    assert_eq!(config.health.threshold_minutes, 180);
    assert_eq!(config.retry_config().max_attempts, 3);
    assert_eq!(config.request_timeout(), Duration::from_secs(15));
}

#[test]
fn test_validation_errors() {
    let mut config = Config::default();
    config.scraping.delay_range = [5.0, 2.0];
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidDelayRange { .. })
    ));

    let mut config = Config::default();
    config.scraping.retry_attempts = 0;
    assert_eq!(
        config.validate(),
        Err(ConfigError::MustBePositive {
            field: "retry_attempts"
        })
    );

    let mut config = Config::default();
    config.logging.format = "xml".into();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogFormat(_))
    ));
}

#[test]
fn test_proxies_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxies.txt");
    std::fs::write(&path, "# pool\nhttp://10.0.0.1:8080\n\nhttp://10.0.0.2:8080\n").unwrap();

    let mut config = Config::default();
    config.scraping.proxies = vec!["http://inline:3128".into()];
    config.scraping.proxies_file = Some(path);

    assert_eq!(
        config.load_proxies().unwrap(),
        [
            "http://inline:3128",
            "http://10.0.0.1:8080",
            "http://10.0.0.2:8080"
        ]
    );
}

#[test]
#[serial]
fn test_env_overrides() {
    std::env::set_var("GIGSCOUT_ENABLED_SCRAPERS", "reddit, jiji");
    std::env::set_var("GIGSCOUT_RETRY_ATTEMPTS", "5");
    std::env::set_var("GIGSCOUT_WEBHOOK_URL", "https://hooks.example.com/x");

    let config = Config::from_env();

    std::env::remove_var("GIGSCOUT_ENABLED_SCRAPERS");
    std::env::remove_var("GIGSCOUT_RETRY_ATTEMPTS");
    std::env::remove_var("GIGSCOUT_WEBHOOK_URL");

    assert_eq!(config.scraping.enabled_scrapers, ["reddit", "jiji"]);
    assert_eq!(config.scraping.retry_attempts, 5);
    assert_eq!(
        config.notifications.webhook.unwrap().url,
        "https://hooks.example.com/x"
    );
}

#[test]
#[serial]
fn test_load_rejects_invalid_env_value() {
    std::env::set_var("GIGSCOUT_LOG_FORMAT", "xml");
    let result = Config::load(Some(&example_path()));
    std::env::remove_var("GIGSCOUT_LOG_FORMAT");

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidLogFormat(_)))
    ));
}

/// A per-job `enabled = true` does not bring back a job left out of the list
#[test]
fn test_override_cannot_enable_unlisted_job() {
    let config: Config = toml::from_str(
        r#"
        [scraping]
        enabled_scrapers = ["reddit"]

        [scrapers.craigslist]
        url = "https://craigslist.org/search/jjj"
        enabled = true
        "#,
    )
    .unwrap();

    assert!(config.is_job_enabled("reddit"));
    assert!(!config.is_job_enabled("craigslist"));
}
