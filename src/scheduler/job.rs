//! Job contract and registry
//!
//! A job is a named, zero-argument unit of work. Its body is either async
//! (runs on the scheduler's runtime) or blocking (runs on the bounded
//! worker pool); callers never special-case the kind.

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::error::{SchedulerError, SchedulerResult};
use crate::config::Config;

/// Normal result of a job body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to completion
    Completed,
    /// The source's robots.txt disallowed the job's target
    SkippedRobots,
}

/// Job body that suspends on I/O
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<JobOutcome>;
}

/// Job body that blocks the calling thread
pub trait BlockingJob: Send + Sync {
    fn run(&self) -> anyhow::Result<JobOutcome>;
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> Job for AsyncFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<JobOutcome>> + Send,
{
    async fn run(&self) -> anyhow::Result<JobOutcome> {
        (self.0)().await
    }
}

struct BlockingFn<F>(F);

impl<F> BlockingJob for BlockingFn<F>
where
    F: Fn() -> anyhow::Result<JobOutcome> + Send + Sync,
{
    fn run(&self) -> anyhow::Result<JobOutcome> {
        (self.0)()
    }
}

/// Either kind of job body behind one `invoke`
#[derive(Clone)]
pub enum JobBody {
    Async(Arc<dyn Job>),
    Blocking(Arc<dyn BlockingJob>),
}

impl JobBody {
    /// Run the body once
    ///
    /// Blocking bodies wait for a worker permit, then run on the blocking
    /// pool. A panic in either kind comes back as an error.
    pub async fn invoke(&self, workers: &Arc<Semaphore>) -> anyhow::Result<JobOutcome> {
        match self {
            JobBody::Async(job) => AssertUnwindSafe(job.run())
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panic_error(payload))),
            JobBody::Blocking(job) => {
                let permit = Arc::clone(workers)
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow!("blocking worker pool is closed"))?;
                let job = Arc::clone(job);

                let joined = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    job.run()
                })
                .await;

                match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(panic_error(e.into_panic())),
                    Err(e) => Err(anyhow!("blocking job did not complete: {e}")),
                }
            }
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, JobBody::Blocking(_))
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow!("job panicked: {message}")
}

/// A registered job: name, body, enabled flag and interval
#[derive(Clone)]
pub struct JobDescriptor {
    name: String,
    body: JobBody,
    enabled: bool,
    interval: Option<Duration>,
}

impl JobDescriptor {
    fn with_body(name: impl Into<String>, body: JobBody) -> Self {
        Self {
            name: name.into(),
            body,
            enabled: true,
            interval: None,
        }
    }

    pub fn from_async(name: impl Into<String>, job: impl Job + 'static) -> Self {
        Self::with_body(name, JobBody::Async(Arc::new(job)))
    }

    pub fn from_blocking(name: impl Into<String>, job: impl BlockingJob + 'static) -> Self {
        Self::with_body(name, JobBody::Blocking(Arc::new(job)))
    }

    /// Async job from a closure returning a future
    pub fn from_async_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<JobOutcome>> + Send + 'static,
    {
        Self::from_async(name, AsyncFn(f))
    }

    /// Blocking job from a closure
    pub fn from_blocking_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<JobOutcome> + Send + Sync + 'static,
    {
        Self::from_blocking(name, BlockingFn(f))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &JobBody {
        &self.body
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Explicit interval, if any
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("blocking", &self.body.is_blocking())
            .field("enabled", &self.enabled)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Ordered collection of jobs with unique names
#[derive(Default, Clone, Debug)]
pub struct JobRegistry {
    jobs: Vec<JobDescriptor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job; names must be unique and intervals non-zero
    pub fn register(&mut self, job: JobDescriptor) -> SchedulerResult<()> {
        if job.name.trim().is_empty() {
            return Err(SchedulerError::InvalidJobName { name: job.name });
        }
        if job.interval == Some(Duration::ZERO) {
            return Err(SchedulerError::InvalidInterval { name: job.name });
        }
        if self.get(&job.name).is_some() {
            return Err(SchedulerError::DuplicateJob { name: job.name });
        }

        tracing::debug!(job = %job.name, blocking = job.body.is_blocking(), "Job registered");
        self.jobs.push(job);
        Ok(())
    }

    /// Apply `enabled_scrapers` and per-job overrides
    pub fn apply_config(&mut self, config: &Config) {
        for job in &mut self.jobs {
            job.enabled = config.is_job_enabled(&job.name);
            if let Some(secs) = config.scrapers.get(&job.name).and_then(|o| o.interval_secs) {
                job.interval = Some(Duration::from_secs(secs));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&JobDescriptor> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.iter().filter(|j| j.enabled)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
