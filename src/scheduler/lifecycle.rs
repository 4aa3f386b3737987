//! Lifecycle wrapper: timing, failure containment and ledger writes
//!
//! Every execution ends in exactly one [`RunRecord`], including executions
//! cancelled mid-flight. Only a completed run refreshes the health ledger.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::job::{JobDescriptor, JobOutcome};
use crate::config::SchedulerConfig;
use crate::metrics;
use crate::models::{RunRecord, RunStatus};
use crate::storage::repository::{HealthLedger, RunLedger};

/// Consecutive-failure circuit breaker settings
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Failures in a row before the circuit opens; 0 disables the breaker
    pub threshold: u32,
    /// How long an open circuit rejects runs
    pub cooldown: Duration,
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            threshold: 0,
            cooldown: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    half_open: bool,
}

/// Wraps every job execution with uniform bookkeeping
pub struct Lifecycle {
    runs: Arc<dyn RunLedger>,
    health: Arc<dyn HealthLedger>,
    workers: Arc<Semaphore>,
    breaker: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, CircuitState>>,
}

impl Lifecycle {
    /// Create a lifecycle with `blocking_workers` permits for blocking bodies
    pub fn new(
        runs: Arc<dyn RunLedger>,
        health: Arc<dyn HealthLedger>,
        blocking_workers: usize,
    ) -> Self {
        Self {
            runs,
            health,
            workers: Arc::new(Semaphore::new(blocking_workers.max(1))),
            breaker: CircuitBreakerConfig::disabled(),
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        runs: Arc<dyn RunLedger>,
        health: Arc<dyn HealthLedger>,
        config: &SchedulerConfig,
    ) -> Self {
        Self::new(runs, health, config.blocking_workers).with_circuit_breaker(
            CircuitBreakerConfig {
                threshold: config.circuit_breaker_threshold,
                cooldown: Duration::from_secs(config.circuit_breaker_cooldown_secs),
            },
        )
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Worker permits shared by every blocking body
    pub fn workers(&self) -> &Arc<Semaphore> {
        &self.workers
    }

    /// Run one execution of `job` and return its final status
    ///
    /// Never fails: body errors and panics become a `failed` record.
    pub async fn run(&self, job: &JobDescriptor) -> RunStatus {
        let name = job.name();
        let mut guard = RunGuard::new(self, name);
        let _in_flight = metrics::job_started();

        info!(job = %name, "Job started");

        if let Some(reason) = self.circuit_rejection(name) {
            warn!(job = %name, reason = %reason, "Circuit open, run rejected");
            return guard.finish(RunStatus::CircuitOpen, Some(reason));
        }

        match job.body().invoke(&self.workers).await {
            Ok(JobOutcome::Completed) => {
                if let Err(e) = self.health.record_success(name, Utc::now()) {
                    error!(job = %name, error = %e, "Failed to update health ledger");
                }
                self.record_result(name, true);
                guard.finish(RunStatus::Success, None)
            }
            Ok(JobOutcome::SkippedRobots) => {
                info!(job = %name, "Job skipped by robots.txt policy");
                guard.finish(RunStatus::SkippedRobots, None)
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(job = %name, error = %message, "Job failed");
                self.record_result(name, false);
                guard.finish(RunStatus::Failed, Some(message))
            }
        }
    }

    fn write_record(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        status: RunStatus,
        error_message: Option<String>,
    ) {
        let record = RunRecord::new(name, started_at, elapsed, status, error_message);
        if let Err(e) = self.runs.record_run(&record) {
            error!(job = %name, error = %e, "Failed to write run record");
        }

        metrics::record_job_run(name, status.as_str(), record.duration_secs);
        info!(
            job = %name,
            status = %status,
            duration_secs = record.duration_secs,
            "Job finished"
        );
    }

    fn circuits(&self) -> MutexGuard<'_, HashMap<String, CircuitState>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reason to reject a run, if the job's circuit is open
    fn circuit_rejection(&self, name: &str) -> Option<String> {
        if self.breaker.threshold == 0 {
            return None;
        }

        let mut circuits = self.circuits();
        let state = circuits.get_mut(name)?;
        let until = state.open_until?;

        let now = Instant::now();
        if now < until {
            let remaining = until - now;
            return Some(format!(
                "circuit open after {} consecutive failures, retry in {}s",
                state.consecutive_failures,
                remaining.as_secs()
            ));
        }

        // Cooldown elapsed: allow one trial run
        state.open_until = None;
        state.half_open = true;
        info!(job = %name, "Circuit half-open, allowing trial run");
        None
    }

    fn record_result(&self, name: &str, success: bool) {
        if self.breaker.threshold == 0 {
            return;
        }

        let mut circuits = self.circuits();
        let state = circuits.entry(name.to_string()).or_default();

        if success {
            if state.half_open {
                info!(job = %name, "Circuit closed");
            }
            *state = CircuitState::default();
            return;
        }

        state.consecutive_failures += 1;
        if state.half_open || state.consecutive_failures >= self.breaker.threshold {
            state.open_until = Some(Instant::now() + self.breaker.cooldown);
            state.half_open = false;
            warn!(
                job = %name,
                failures = state.consecutive_failures,
                cooldown_secs = self.breaker.cooldown.as_secs(),
                "Circuit opened"
            );
        }
    }
}

/// Writes the run record exactly once, even if the execution is dropped
struct RunGuard<'a> {
    lifecycle: &'a Lifecycle,
    name: &'a str,
    started_at: DateTime<Utc>,
    start: Instant,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn new(lifecycle: &'a Lifecycle, name: &'a str) -> Self {
        Self {
            lifecycle,
            name,
            started_at: Utc::now(),
            start: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self, status: RunStatus, error_message: Option<String>) -> RunStatus {
        self.finished = true;
        self.lifecycle.write_record(
            self.name,
            self.started_at,
            self.start.elapsed(),
            status,
            error_message,
        );
        status
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(
                RunStatus::Failed,
                Some("execution cancelled before completion".to_string()),
            );
        }
    }
}
