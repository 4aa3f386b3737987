//! Health monitor for silently-dead jobs
//!
//! Compares each job's last successful run against a staleness threshold
//! and raises one alert per unhealthy job through the dispatcher. A job
//! that is enabled but has never succeeded counts as unhealthy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HealthConfig;
use crate::notifications::{Dispatcher, Notification};
use crate::scheduler::{Job, JobOutcome};
use crate::storage::repository::HealthLedger;

/// Source label used for health alerts
pub const HEALTH_SOURCE: &str = "System Health";

/// Why a job was flagged
#[derive(Debug, Clone, PartialEq)]
pub enum HealthIssue {
    /// Last success is older than the threshold
    Stale {
        last_run: DateTime<Utc>,
        minutes_since: i64,
    },
    /// Enabled job with no recorded success
    NeverSucceeded,
}

/// One health violation
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAlert {
    pub job_name: String,
    pub issue: HealthIssue,
}

impl HealthAlert {
    fn notification(&self, threshold_minutes: u64) -> Notification {
        Notification::new(
            HEALTH_SOURCE,
            format!("Scraper '{}' is unhealthy", self.job_name),
            format!("health://{}", self.job_name),
            format!("{} (threshold {} minutes)", self.issue, threshold_minutes),
        )
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthIssue::Stale {
                last_run,
                minutes_since,
            } => write!(
                f,
                "last successful run {} minutes ago at {}",
                minutes_since,
                last_run.to_rfc3339()
            ),
            HealthIssue::NeverSucceeded => write!(f, "no successful run recorded"),
        }
    }
}

/// Periodic staleness check over the health ledger
pub struct HealthMonitor {
    ledger: Arc<dyn HealthLedger>,
    dispatcher: Arc<Dispatcher>,
    jobs: Vec<String>,
    threshold_minutes: u64,
}

impl HealthMonitor {
    /// `jobs` lists the enabled job names expected to report
    pub fn new(
        ledger: Arc<dyn HealthLedger>,
        dispatcher: Arc<Dispatcher>,
        jobs: Vec<String>,
        threshold_minutes: u64,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            jobs,
            threshold_minutes,
        }
    }

    pub fn from_config(
        ledger: Arc<dyn HealthLedger>,
        dispatcher: Arc<Dispatcher>,
        jobs: Vec<String>,
        config: &HealthConfig,
    ) -> Self {
        Self::new(ledger, dispatcher, jobs, config.threshold_minutes)
    }

    pub fn threshold_minutes(&self) -> u64 {
        self.threshold_minutes
    }

    /// Find unhealthy jobs as of `now` without sending anything
    pub fn evaluate(
        &self,
        threshold_minutes: u64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HealthAlert>> {
        let mut last_runs: BTreeMap<String, Option<DateTime<Utc>>> = self
            .jobs
            .iter()
            .map(|name| (name.clone(), None))
            .collect();
        for record in self.ledger.health_records()? {
            last_runs.insert(record.job_name, Some(record.last_run));
        }

        let threshold_secs =
            i64::try_from(threshold_minutes.saturating_mul(60)).unwrap_or(i64::MAX);
        let alerts = last_runs
            .into_iter()
            .filter_map(|(job_name, last_run)| {
                let issue = match last_run {
                    None => HealthIssue::NeverSucceeded,
                    Some(last_run) => {
                        let since = now - last_run;
                        if since.num_seconds() <= threshold_secs {
                            return None;
                        }
                        HealthIssue::Stale {
                            last_run,
                            minutes_since: since.num_minutes(),
                        }
                    }
                };
                Some(HealthAlert { job_name, issue })
            })
            .collect();

        Ok(alerts)
    }

    /// Check every job and send one alert per unhealthy job
    pub async fn check_health(&self, threshold_minutes: u64) -> anyhow::Result<Vec<HealthAlert>> {
        let alerts = self.evaluate(threshold_minutes, Utc::now())?;

        for alert in &alerts {
            warn!(job = %alert.job_name, issue = %alert.issue, "Job unhealthy");
            self.dispatcher
                .notify(&alert.notification(threshold_minutes))
                .await;
        }

        if alerts.is_empty() {
            info!(threshold_minutes, "All jobs healthy");
        } else {
            info!(unhealthy = alerts.len(), threshold_minutes, "Health check complete");
        }
        Ok(alerts)
    }
}

#[async_trait]
impl Job for HealthMonitor {
    async fn run(&self) -> anyhow::Result<JobOutcome> {
        self.check_health(self.threshold_minutes).await?;
        Ok(JobOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::SqliteRepository;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_evaluate_thresholds() {
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let now = Utc::now();
        repo.record_success("stale", now - ChronoDuration::minutes(31))
            .unwrap();
        repo.record_success("fresh", now - ChronoDuration::minutes(10))
            .unwrap();

        let monitor = HealthMonitor::new(
            repo,
            Arc::new(Dispatcher::new()),
            vec!["fresh".into(), "missing".into()],
            30,
        );
        let alerts = monitor.evaluate(30, now).unwrap();

        let names: Vec<_> = alerts.iter().map(|a| a.job_name.as_str()).collect();
        assert_eq!(names, ["missing", "stale"]);
        assert_eq!(alerts[0].issue, HealthIssue::NeverSucceeded);
        assert!(matches!(
            alerts[1].issue,
            HealthIssue::Stale { minutes_since: 31, .. }
        ));
    }

    #[test]
    fn test_alert_notification_shape() {
        let alert = HealthAlert {
            job_name: "jiji".into(),
            issue: HealthIssue::NeverSucceeded,
        };
        let n = alert.notification(30);
        assert_eq!(n.source, HEALTH_SOURCE);
        assert_eq!(n.link, "health://jiji");
        assert!(n.snippet.contains("threshold 30 minutes"));
    }
}
