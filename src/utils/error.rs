//! Error types for outbound fetching
//!
//! The fetch taxonomy splits every failure into transient (retried with
//! backoff) and permanent (surfaced immediately).

use thiserror::Error;

/// HTTP statuses that are worth another attempt
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// Request timed out before a response arrived
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    /// Connection could not be established or was reset
    #[error("Connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Any other transport error (body decoding, redirects, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client could not be constructed (bad proxy, TLS backend, ...)
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    /// Classify a transport error coming back from reqwest
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            Self::Connection {
                url: url.to_string(),
                source: err,
            }
        } else {
            Self::Http(err)
        }
    }

    /// Whether this status code is transient
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Whether the failure should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { status, .. } => Self::is_retryable_status(*status),
            Self::Http(_) | Self::InvalidUrl(_) | Self::ClientBuild(_) => false,
        }
    }

    /// Status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503] {
            let err = FetchError::Status {
                status,
                url: "http://x/".into(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn test_permanent_statuses() {
        for status in [400, 401, 403, 404, 410, 504] {
            let err = FetchError::Status {
                status,
                url: "http://x/".into(),
            };
            assert!(!err.is_retryable(), "{status} should not be retryable");
        }
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = FetchError::Timeout {
            url: "http://x/".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_invalid_url_is_permanent() {
        assert!(!FetchError::InvalidUrl("nope".into()).is_retryable());
    }
}
