//! Prometheus metrics for the scheduler, fetcher, store and dispatcher
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, CounterVec, Encoder, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for job lifecycle metrics
struct JobMetrics {
    runs: IntCounterVec,
    duration: HistogramVec,
    in_flight: IntGauge,
    overlaps_skipped: IntCounterVec,
}

/// Container for outbound request and pipeline metrics
struct PipelineMetrics {
    fetch_retries: IntCounter,
    fetch_failures: IntCounterVec,
    robots_fetches: IntCounterVec,
    notifications: IntCounterVec,
    opportunities: CounterVec,
}

static JOB_METRICS: OnceLock<JobMetrics> = OnceLock::new();

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// If metric registration fails, errors are returned and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = gigscout::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let jobs = JobMetrics {
        runs: register_int_counter_vec!(
            "gigscout_job_runs_total",
            "Job executions by job and final status",
            &["job", "status"]
        )?,
        duration: register_histogram_vec!(
            "gigscout_job_duration_seconds",
            "Job execution time in seconds",
            &["job"],
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
        )?,
        in_flight: register_int_gauge!(
            "gigscout_jobs_in_flight",
            "Number of job executions currently running"
        )?,
        overlaps_skipped: register_int_counter_vec!(
            "gigscout_job_overlaps_skipped_total",
            "Triggers skipped because the previous run was still in flight",
            &["job"]
        )?,
    };

    let pipeline = PipelineMetrics {
        fetch_retries: register_int_counter!(
            "gigscout_fetch_retries_total",
            "Retries performed by the resilient fetcher"
        )?,
        fetch_failures: register_int_counter_vec!(
            "gigscout_fetch_failures_total",
            "Fetches that failed after retries, by kind",
            &["kind"]
        )?,
        robots_fetches: register_int_counter_vec!(
            "gigscout_robots_fetches_total",
            "robots.txt lookups by outcome",
            &["outcome"]
        )?,
        notifications: register_int_counter_vec!(
            "gigscout_notifications_total",
            "Notification deliveries by channel and result",
            &["channel", "result"]
        )?,
        opportunities: register_counter_vec!(
            "gigscout_opportunities_total",
            "Opportunity save attempts by result",
            &["source", "result"]
        )?,
    };

    JOB_METRICS
        .set(jobs)
        .map_err(|_| "Job metrics already initialized")?;
    PIPELINE_METRICS
        .set(pipeline)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    JOB_METRICS.get().is_some() && PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished job execution
pub fn record_job_run(job: &str, status: &str, duration_secs: f64) {
    let Some(m) = JOB_METRICS.get() else {
        return;
    };

    m.runs.with_label_values(&[job, status]).inc();
    m.duration.with_label_values(&[job]).observe(duration_secs);
}

/// Guard that keeps the in-flight gauge raised while alive
pub struct InFlightGuard {
    active: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.active {
            if let Some(m) = JOB_METRICS.get() {
                m.in_flight.dec();
            }
        }
    }
}

/// Mark one job execution as in flight until the guard drops
pub fn job_started() -> InFlightGuard {
    match JOB_METRICS.get() {
        Some(m) => {
            m.in_flight.inc();
            InFlightGuard { active: true }
        }
        None => InFlightGuard { active: false },
    }
}

/// Record a trigger skipped by the overlap guard
pub fn record_overlap_skipped(job: &str) {
    if let Some(m) = JOB_METRICS.get() {
        m.overlaps_skipped.with_label_values(&[job]).inc();
    }
}

/// Record retries spent on one fetch
pub fn record_fetch_retries(retries: u32) {
    if retries == 0 {
        return;
    }
    if let Some(m) = PIPELINE_METRICS.get() {
        m.fetch_retries.inc_by(u64::from(retries));
    }
}

/// Record a terminal fetch failure
pub fn record_fetch_failure(kind: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.fetch_failures.with_label_values(&[kind]).inc();
    }
}

/// Record a robots.txt lookup (`ok` or `failed`)
pub fn record_robots_fetch(outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.robots_fetches.with_label_values(&[outcome]).inc();
    }
}

/// Record one channel delivery
pub fn record_notification(channel: &str, success: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        let result = if success { "delivered" } else { "failed" };
        m.notifications.with_label_values(&[channel, result]).inc();
    }
}

/// Record a store save (`inserted` or `duplicate`)
pub fn record_opportunity(source: &str, inserted: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        let result = if inserted { "inserted" } else { "duplicate" };
        m.opportunities.with_label_values(&[source, result]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // Idempotent
        assert!(init_metrics().is_ok());
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_job_run("jiji", "success", 1.5);
        let text = encode_metrics().unwrap();
        assert!(text.contains("gigscout_job_runs_total"));
    }

    #[test]
    fn test_in_flight_guard() {
        ensure_metrics_initialized();
        let guard = job_started();
        drop(guard);
    }

    #[test]
    fn test_recorders_do_not_panic() {
        ensure_metrics_initialized();
        record_overlap_skipped("jiji");
        record_fetch_retries(2);
        record_fetch_retries(0);
        record_fetch_failure("status");
        record_robots_fetch("failed");
        record_notification("webhook", true);
        record_opportunity("Reddit", false);
    }
}
