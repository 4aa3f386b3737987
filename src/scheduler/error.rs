//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// A job with this name is already registered
    DuplicateJob { name: String },

    /// Job name is empty or otherwise unusable
    InvalidJobName { name: String },

    /// Trigger interval must be non-zero
    InvalidInterval { name: String },

    /// Operation requires a stopped scheduler
    AlreadyRunning,

    /// Operation requires a running scheduler
    NotRunning,

    /// In-flight jobs did not finish inside the drain window
    DrainTimeout { remaining: usize },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateJob { name } => {
                write!(f, "Job '{}' is already registered", name)
            }
            Self::InvalidJobName { name } => {
                write!(f, "Invalid job name '{}'", name)
            }
            Self::InvalidInterval { name } => {
                write!(f, "Job '{}' has a zero trigger interval", name)
            }
            Self::AlreadyRunning => write!(f, "Scheduler is already running"),
            Self::NotRunning => write!(f, "Scheduler is not running"),
            Self::DrainTimeout { remaining } => {
                write!(f, "{} job(s) still running after drain timeout", remaining)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DrainTimeout { .. })
    }
}
