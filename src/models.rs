// Core data structures for gigscout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An opportunity as stored, deduplicated by `(source, link)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub price: Option<String>,
    pub full_description: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub contact_info: Option<String>,
    pub category: Option<String>,
}

/// An opportunity produced by a job, before it reaches the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub source: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub price: Option<String>,
    pub full_description: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub contact_info: Option<String>,
    pub category: Option<String>,
}

impl NewOpportunity {
    /// Create with the four mandatory fields
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
            ..Default::default()
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.full_description = Some(description.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Final status of one job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    SkippedRobots,
    CircuitOpen,
}

impl RunStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::SkippedRobots => "skipped_robots",
            RunStatus::CircuitOpen => "circuit_open",
        }
    }

    /// All statuses, in ledger order
    pub fn all() -> &'static [RunStatus] {
        &[
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::SkippedRobots,
            RunStatus::CircuitOpen,
        ]
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "skipped_robots" => Ok(RunStatus::SkippedRobots),
            "circuit_open" => Ok(RunStatus::CircuitOpen),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// One row of the performance ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn new(
        job_name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            started_at,
            duration_secs: duration.as_secs_f64(),
            status,
            error_message,
        }
    }
}

/// Health ledger row: last successful run of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub job_name: String,
    pub last_run: DateTime<Utc>,
}

/// Per-job aggregates over the performance ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub job_name: String,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped_robots: usize,
    pub circuit_open: usize,
    pub avg_duration_secs: f64,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Calculate success rate (0.0 - 1.0), skips excluded
    pub fn success_rate(&self) -> f64 {
        let attempted = self.success + self.failed;
        if attempted == 0 {
            return 1.0;
        }
        self.success as f64 / attempted as f64
    }

    pub(crate) fn add(&mut self, status: RunStatus, count: usize) {
        self.total += count;
        match status {
            RunStatus::Success => self.success += count,
            RunStatus::Failed => self.failed += count,
            RunStatus::SkippedRobots => self.skipped_robots += count,
            RunStatus::CircuitOpen => self.circuit_open += count,
        }
    }
}
