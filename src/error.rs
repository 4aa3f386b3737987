//! Unified error handling for the gigscout crate
//!
//! Domain modules keep their own error enums ([`FetchError`],
//! [`SchedulerError`], [`ChannelError`], [`ConfigError`]); this module wraps
//! them in a single [`Error`] at the command-line boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gigscout::error::{Error, ErrorCategory, GigscoutErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Transient failure: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::notifications::channels::ChannelError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::FetchError;

/// Common trait for all gigscout error types
pub trait GigscoutErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Notification,
    Config,
    Scheduler,
    /// Storage, I/O and anything else reported with context only
    Other,
}

impl ErrorCategory {
    /// Short label used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Notification => "notification",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Error returned by the command-line entry points
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Notification error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Context chain from storage, I/O and job glue
    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl GigscoutErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Channel(e) => e.is_recoverable(),
            Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Channel(_) => ErrorCategory::Notification,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
