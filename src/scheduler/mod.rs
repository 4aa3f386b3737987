//! Periodic job scheduling
//!
//! The scheduler owns a [`JobRegistry`] and fires each enabled job on its
//! own fixed interval. Every trigger spawns one execution of the
//! [`Lifecycle`] wrapper; the scheduler never retries or interprets
//! outcomes itself.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Scheduler ────────────────────────────┐
//! │                                                                   │
//! │  trigger loop (per job)     trigger loop (per maintenance task)   │
//! │   interval + shutdown rx     interval + shutdown rx               │
//! │          │                           │                            │
//! │          ▼                           ▼                            │
//! │   overlap guard              overlap guard                        │
//! │          │                           │                            │
//! │          ▼                           ▼                            │
//! │   Lifecycle::run ─► ledgers   JobBody::invoke                     │
//! │          │                                                        │
//! │          ▼                                                        │
//! │   async body (runtime) | blocking body (worker pool)              │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Maintenance tasks (health monitor, export) share the trigger machinery
//! but do not write run records.
//!
//! # Shutdown
//!
//! [`Scheduler::stop`] halts triggers and returns at once.
//! [`Scheduler::shutdown`] additionally waits a bounded time for in-flight
//! executions, then aborts the rest.

pub mod error;
pub mod job;
pub mod lifecycle;

pub use error::{SchedulerError, SchedulerResult};
pub use job::{BlockingJob, Job, JobBody, JobDescriptor, JobOutcome, JobRegistry};
pub use lifecycle::{CircuitBreakerConfig, Lifecycle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::metrics;
use crate::models::RunStatus;

/// A recurring task outside the job registry
#[derive(Clone)]
struct MaintenanceTask {
    name: String,
    interval: Duration,
    body: JobBody,
}

/// Clears a job's running flag when its execution ends
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a trigger loop fires
#[derive(Clone)]
enum Target {
    Job(Arc<JobDescriptor>),
    Maintenance(Arc<MaintenanceTask>),
}

impl Target {
    fn name(&self) -> &str {
        match self {
            Target::Job(job) => job.name(),
            Target::Maintenance(task) => &task.name,
        }
    }
}

/// Interval scheduler for registered jobs
pub struct Scheduler {
    registry: JobRegistry,
    maintenance: Vec<MaintenanceTask>,
    lifecycle: Arc<Lifecycle>,
    default_interval: Duration,
    run_on_start: bool,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
    triggers: Mutex<JoinSet<()>>,
    executions: Arc<Mutex<JoinSet<()>>>,
}

impl Scheduler {
    pub fn new(lifecycle: Arc<Lifecycle>, config: &SchedulerConfig) -> Self {
        Self::with_settings(
            lifecycle,
            Duration::from_secs(config.default_interval_secs),
            config.run_on_start,
        )
    }

    /// Create a scheduler with an explicit default interval
    pub fn with_settings(
        lifecycle: Arc<Lifecycle>,
        default_interval: Duration,
        run_on_start: bool,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: JobRegistry::new(),
            maintenance: Vec::new(),
            lifecycle,
            default_interval,
            run_on_start,
            shutdown_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            triggers: Mutex::new(JoinSet::new()),
            executions: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Register a job; rejected once the scheduler has started
    pub fn register(&mut self, job: JobDescriptor) -> SchedulerResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.registry.register(job)
    }

    /// Register a recurring maintenance task such as the health monitor
    pub fn register_maintenance(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        body: JobBody,
    ) -> SchedulerResult<()> {
        let name = name.into();
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        if name.trim().is_empty() {
            return Err(SchedulerError::InvalidJobName { name });
        }
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval { name });
        }
        if self.maintenance.iter().any(|t| t.name == name) {
            return Err(SchedulerError::DuplicateJob { name });
        }

        self.maintenance.push(MaintenanceTask { name, interval, body });
        Ok(())
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Mutable registry access before start (config overrides)
    pub fn registry_mut(&mut self) -> SchedulerResult<&mut JobRegistry> {
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        Ok(&mut self.registry)
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Begin issuing triggers
    ///
    /// Must be called from within a tokio runtime. Each enabled job and
    /// maintenance task gets its own trigger loop.
    pub fn start(&self) -> SchedulerResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut triggers = lock(&self.triggers);

        for job in self.registry.enabled() {
            let period = job.interval().unwrap_or(self.default_interval);
            let target = Target::Job(Arc::new(job.clone()));
            triggers.spawn(self.trigger_loop(target, period));
        }

        for task in &self.maintenance {
            let target = Target::Maintenance(Arc::new(task.clone()));
            triggers.spawn(self.trigger_loop(target, task.interval));
        }

        let disabled = self.registry.len() - self.registry.enabled().count();
        info!(
            jobs = self.registry.len() - disabled,
            disabled = disabled,
            maintenance = self.maintenance.len(),
            "Scheduler started"
        );
        Ok(())
    }

    fn trigger_loop(
        &self,
        target: Target,
        period: Duration,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let lifecycle = Arc::clone(&self.lifecycle);
        let executions = Arc::clone(&self.executions);
        let run_on_start = self.run_on_start;

        async move {
            let mut ticker = if run_on_start {
                interval(period)
            } else {
                interval_at(Instant::now() + period, period)
            };
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let running = Arc::new(AtomicBool::new(false));

            debug!(job = %target.name(), period_secs = period.as_secs_f64(), "Trigger loop started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        debug!(job = %target.name(), "Trigger loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if running.swap(true, Ordering::SeqCst) {
                            warn!(
                                job = %target.name(),
                                "Previous execution still running, skipping trigger"
                            );
                            metrics::record_overlap_skipped(target.name());
                            continue;
                        }

                        let flag = RunningFlag(Arc::clone(&running));
                        let execution = execute(target.clone(), Arc::clone(&lifecycle), flag);

                        let mut set = lock(&executions);
                        while set.try_join_next().is_some() {}
                        set.spawn(execution);
                    }
                }
            }
        }
    }

    /// Stop issuing triggers without waiting for in-flight executions
    pub fn stop(&self) -> SchedulerResult<()> {
        if !self.started.load(Ordering::SeqCst) || self.stopped.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        let _ = self.shutdown_tx.send(true);
        lock(&self.triggers).abort_all();
        info!("Scheduler stopped issuing triggers");
        Ok(())
    }

    /// Stop, then wait up to `drain` for in-flight executions
    ///
    /// Trigger loops are joined before the execution set is collected, so a
    /// trigger that fired while stopping cannot leave an untracked execution.
    /// Executions still running after the window are aborted. Blocking
    /// bodies already on a worker thread run to completion detached.
    pub async fn shutdown(&self, drain: Duration) -> SchedulerResult<()> {
        self.stop()?;

        let mut triggers = std::mem::take(&mut *lock(&self.triggers));
        while triggers.join_next().await.is_some() {}

        let mut pending = std::mem::take(&mut *lock(&self.executions));
        let in_flight = pending.len();
        if in_flight > 0 {
            info!(in_flight, drain_secs = drain.as_secs_f64(), "Draining in-flight jobs");
        }

        let drained = tokio::time::timeout(drain, async {
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(error = %e, "Execution task panicked");
                    }
                }
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("Scheduler shut down cleanly");
                Ok(())
            }
            Err(_) => {
                let remaining = pending.len();
                warn!(remaining, "Drain timeout elapsed, aborting in-flight jobs");
                pending.abort_all();
                while pending.join_next().await.is_some() {}
                Err(SchedulerError::DrainTimeout { remaining })
            }
        }
    }

    /// Run every enabled job once, concurrently, and wait for all of them
    pub async fn run_all_once(&self) -> Vec<(String, RunStatus)> {
        let runs = self.registry.enabled().map(|job| {
            let lifecycle = Arc::clone(&self.lifecycle);
            async move { (job.name().to_string(), lifecycle.run(job).await) }
        });
        futures::future::join_all(runs).await
    }
}

async fn execute(target: Target, lifecycle: Arc<Lifecycle>, flag: RunningFlag) {
    let _flag = flag;
    match target {
        Target::Job(job) => {
            lifecycle.run(&job).await;
        }
        Target::Maintenance(task) => {
            debug!(task = %task.name, "Maintenance task started");
            match task.body.invoke(lifecycle.workers()).await {
                Ok(_) => debug!(task = %task.name, "Maintenance task finished"),
                Err(e) => error!(task = %task.name, error = %format!("{e:#}"), "Maintenance task failed"),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
