//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use anyhow::{Context, Result};
use url::Url;

/// Extract the network location (`host[:port]`) from a URL
///
/// This is the key the politeness cache uses per domain.
pub fn extract_netloc(url: &str) -> Result<String> {
    let parsed = Url::parse(url).context("Invalid URL")?;
    let host = parsed.host_str().context("No host in URL")?;

    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Path plus query of a URL, as matched against robots.txt rules
pub fn path_and_query(url: &str) -> Result<String> {
    let parsed = Url::parse(url).context("Invalid URL")?;
    Ok(match parsed.query() {
        Some(q) => format!("{}?{q}", parsed.path()),
        None => parsed.path().to_string(),
    })
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_netloc() {
        assert_eq!(
            extract_netloc("https://jiji.ug/search?query=website").unwrap(),
            "jiji.ug"
        );
        assert_eq!(
            extract_netloc("http://127.0.0.1:8080/a/b").unwrap(),
            "127.0.0.1:8080"
        );
        assert!(extract_netloc("not a url").is_err());
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(
            path_and_query("https://x.com/search?q=dev").unwrap(),
            "/search?q=dev"
        );
        assert_eq!(path_and_query("https://x.com").unwrap(), "/");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
        assert_eq!(truncate_text("héllo wörld", 8), "héllo...");
    }
}
