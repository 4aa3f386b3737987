//! Resilient HTTP fetcher with bounded retry and backoff
//!
//! Every outbound request goes through [`ResilientFetcher::fetch`]:
//! - A default timeout is applied unless the caller sets one
//! - Timeouts, connection failures and 429/500/502/503 are retried with
//!   exponential backoff
//! - Any other non-2xx status fails at once
//! - One `reqwest::Client` is kept per proxy

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Method,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::crawler::identity::FALLBACK_USER_AGENT;
use crate::metrics;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Overrides the fetcher's default timeout
    pub timeout: Option<Duration>,

    /// Extra headers sent with the request
    pub headers: HeaderMap,

    /// User-Agent for this request
    pub user_agent: Option<String>,

    /// Proxy URL for this request
    pub proxy: Option<String>,

    /// Request body (POST/PUT)
    pub body: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A successful (2xx) response with its body read
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl FetchResponse {
    /// Decode the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// HTTP fetcher shared by every job
pub struct ResilientFetcher {
    /// Clients keyed by proxy URL; the empty key is the direct client
    clients: Mutex<HashMap<String, Client>>,

    /// Timeout used when the caller does not set one
    default_timeout: Duration,

    /// Retry policy for transient failures
    retry: RetryConfig,
}

impl ResilientFetcher {
    /// Create a fetcher with an explicit timeout and retry policy
    ///
    /// # Errors
    ///
    /// Returns `FetchError::ClientBuild` if the HTTP client cannot be created
    pub fn new(default_timeout: Duration, retry: RetryConfig) -> Result<Self, FetchError> {
        let direct = build_client(None)?;
        let mut clients = HashMap::new();
        clients.insert(String::new(), direct);

        Ok(Self {
            clients: Mutex::new(clients),
            default_timeout,
            retry,
        })
    }

    /// Create a fetcher from the scraping configuration
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(config.request_timeout(), config.retry_config())
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// GET with default options
    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch(Method::GET, url, FetchOptions::default()).await
    }

    /// Perform a request with retry on transient failures
    ///
    /// # Errors
    ///
    /// - `FetchError::Status` for non-retryable statuses, immediately
    /// - The last transient error once attempts are exhausted
    /// - `FetchError::InvalidUrl` / `FetchError::ClientBuild` without any request
    #[instrument(skip(self, options))]
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        options: FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        let client = self.client_for(options.proxy.as_deref())?;
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let attempts = AtomicU32::new(0);

        let result = with_retry_if(
            &self.retry,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.attempt(&client, &method, url, timeout, &options, attempt)
            },
            FetchError::is_retryable,
        )
        .await;

        metrics::record_fetch_retries(attempts.load(Ordering::SeqCst).saturating_sub(1));
        if let Err(e) = &result {
            metrics::record_fetch_failure(failure_kind(e));
        }

        result
    }

    async fn attempt(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        timeout: Duration,
        options: &FetchOptions,
        attempt: u32,
    ) -> Result<FetchResponse, FetchError> {
        debug!(url = %url, attempt = attempt, "Sending request");

        let user_agent = options.user_agent.as_deref().unwrap_or(FALLBACK_USER_AGENT);
        let mut request = client
            .request(method.clone(), url)
            .timeout(timeout)
            .headers(options.headers.clone())
            .header(USER_AGENT, user_agent);

        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Request succeeded");

        Ok(FetchResponse {
            status: status.as_u16(),
            url: final_url,
            body,
        })
    }

    /// Client for a proxy, built on first use
    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let key = proxy.unwrap_or_default();
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| FetchError::ClientBuild("client cache poisoned".to_string()))?;

        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let client = build_client(proxy)?;
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }
}

fn build_client(proxy: Option<&str>) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .default_headers(default_headers())
        .gzip(true)
        .cookie_store(true);

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| FetchError::ClientBuild(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

fn failure_kind(err: &FetchError) -> &'static str {
    match err {
        FetchError::Timeout { .. } => "timeout",
        FetchError::Connection { .. } => "connection",
        FetchError::Status { .. } => "status",
        FetchError::Http(_) => "http",
        FetchError::InvalidUrl(_) => "invalid_url",
        FetchError::ClientBuild(_) => "client_build",
    }
}
