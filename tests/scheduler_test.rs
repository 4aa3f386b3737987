//! Scheduler behaviour: triggers, isolation, overlap guard and shutdown

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use gigscout::models::RunStatus;
use gigscout::scheduler::{JobBody, JobDescriptor, JobOutcome, Scheduler, SchedulerError};
use gigscout::storage::{HealthLedger, RunLedger, SqliteRepository};

fn scheduler(repo: &Arc<SqliteRepository>, run_on_start: bool) -> Scheduler {
    Scheduler::with_settings(
        Arc::new(common::test_lifecycle(repo)),
        Duration::from_secs(3600),
        run_on_start,
    )
}

/// Poll `cond` every 10ms until it holds or `limit` elapses
async fn wait_until(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn counting_job(name: &str, counter: &Arc<AtomicU32>) -> JobDescriptor {
    let counter = Arc::clone(counter);
    JobDescriptor::from_async_fn(name, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutcome::Completed)
        }
    })
}

/// One failing and one succeeding job, each fired once
#[tokio::test]
async fn test_failing_job_isolated_from_sibling() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    scheduler
        .register(JobDescriptor::from_async_fn("broken", || async {
            Err(anyhow!("upstream changed its markup"))
        }))
        .unwrap();
    scheduler
        .register(JobDescriptor::from_async_fn("healthy", || async {
            Ok(JobOutcome::Completed)
        }))
        .unwrap();

    scheduler.start().unwrap();
    let both_ran = wait_until(Duration::from_secs(2), || {
        repo.run_stats().unwrap().iter().map(|s| s.total).sum::<usize>() == 2
    })
    .await;
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(both_ran);

    let broken = repo.runs_for("broken", 10).unwrap();
    let healthy = repo.runs_for("healthy", 10).unwrap();
    assert_eq!(broken.len(), 1);
    assert_eq!(healthy.len(), 1);
    assert_eq!(broken[0].status, RunStatus::Failed);
    assert_eq!(healthy[0].status, RunStatus::Success);

    assert!(repo.health_for("healthy").unwrap().is_some());
    assert!(repo.health_for("broken").unwrap().is_none());
}

/// Triggers that arrive while a run is in flight are skipped
#[tokio::test(start_paused = true)]
async fn test_overlap_guard_skips_busy_job() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    let active = Arc::new(AtomicU32::new(0));
    let max_active = Arc::new(AtomicU32::new(0));
    let started = Arc::new(AtomicU32::new(0));

    let (a, m, s) = (active.clone(), max_active.clone(), started.clone());
    let job = JobDescriptor::from_async_fn("slow", move || {
        let (a, m, s) = (a.clone(), m.clone(), s.clone());
        async move {
            s.fetch_add(1, Ordering::SeqCst);
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(250)).await;
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(JobOutcome::Completed)
        }
    })
    .with_interval(Duration::from_millis(100));
    scheduler.register(job).unwrap();

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(1050)).await;
    scheduler.shutdown(Duration::from_secs(5)).await.unwrap();

    let started = started.load(Ordering::SeqCst);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert!(started >= 2, "started {started}");
    assert!(started < 11, "overlapping triggers were not skipped");

    // Skipped triggers leave no record
    assert_eq!(repo.runs_for("slow", 100).unwrap().len(), started as usize);
}

/// stop() returns at once and no trigger fires afterwards
#[tokio::test]
async fn test_stop_is_prompt_and_final() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    let fast = Arc::new(AtomicU32::new(0));
    scheduler
        .register(counting_job("fast", &fast).with_interval(Duration::from_millis(20)))
        .unwrap();
    scheduler
        .register(JobDescriptor::from_async_fn("forever", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(JobOutcome::Completed)
        }))
        .unwrap();

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || fast.load(Ordering::SeqCst) >= 2).await);

    let before = std::time::Instant::now();
    scheduler.stop().unwrap();
    assert!(before.elapsed() < Duration::from_millis(100));
    assert!(!scheduler.is_running());

    // Let any execution spawned before stop() finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_stop = fast.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fast.load(Ordering::SeqCst), after_stop);

    assert!(matches!(scheduler.stop(), Err(SchedulerError::NotRunning)));
}

/// Every execution started before shutdown is drained and recorded; none start after
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_leaves_no_untracked_execution() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    let started = Arc::new(AtomicU32::new(0));
    for i in 0..6 {
        scheduler
            .register(
                counting_job(&format!("busy_{i}"), &started).with_interval(Duration::from_millis(1)),
            )
            .unwrap();
    }

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || started.load(Ordering::SeqCst) >= 12).await);
    scheduler.shutdown(Duration::from_secs(5)).await.unwrap();

    let at_shutdown = started.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(started.load(Ordering::SeqCst), at_shutdown);

    let recorded: usize = repo.run_stats().unwrap().iter().map(|s| s.total).sum();
    assert_eq!(recorded, at_shutdown as usize);
}

/// A panicking blocking job does not stop other jobs from firing
#[tokio::test]
async fn test_blocking_panic_does_not_stop_scheduler() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    scheduler
        .register(
            JobDescriptor::from_blocking_fn("selenium", || {
                std::thread::sleep(Duration::from_millis(30));
                panic!("browser driver crashed")
            })
            .with_interval(Duration::from_millis(50)),
        )
        .unwrap();

    let ticks = Arc::new(AtomicU32::new(0));
    scheduler
        .register(counting_job("api", &ticks).with_interval(Duration::from_millis(20)))
        .unwrap();

    scheduler.start().unwrap();
    let kept_firing = wait_until(Duration::from_secs(3), || {
        ticks.load(Ordering::SeqCst) >= 5
            && repo.runs_for("selenium", 100).unwrap().len() >= 2
    })
    .await;
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(kept_firing);

    let selenium = repo.runs_for("selenium", 100).unwrap();
    assert!(selenium.iter().all(|r| r.status == RunStatus::Failed));
    assert!(selenium[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("browser driver crashed"));
}

/// Runs still in flight after the drain window are cancelled and recorded
#[tokio::test]
async fn test_shutdown_drain_timeout_cancels() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    let entered = Arc::new(AtomicU32::new(0));
    let flag = entered.clone();
    scheduler
        .register(JobDescriptor::from_async_fn("stuck", move || {
            let flag = flag.clone();
            async move {
                flag.store(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(JobOutcome::Completed)
            }
        }))
        .unwrap();

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst) == 1).await);

    let result = scheduler.shutdown(Duration::from_millis(50)).await;
    assert!(matches!(
        result,
        Err(SchedulerError::DrainTimeout { remaining: 1 })
    ));

    let runs = repo.runs_for("stuck", 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("cancelled"));
}

/// Disabled jobs never fire; maintenance tasks do, without run records
#[tokio::test]
async fn test_disabled_jobs_and_maintenance() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, true);

    let disabled = Arc::new(AtomicU32::new(0));
    scheduler
        .register(counting_job("off", &disabled).enabled(false))
        .unwrap();

    let checks = Arc::new(AtomicU32::new(0));
    let body = counting_job("health_monitor", &checks).body().clone();
    scheduler
        .register_maintenance("health_monitor", Duration::from_millis(20), body)
        .unwrap();

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || checks.load(Ordering::SeqCst) >= 2).await);
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(disabled.load(Ordering::SeqCst), 0);
    assert!(repo.runs_for("health_monitor", 10).unwrap().is_empty());
    assert!(repo.run_stats().unwrap().is_empty());
}

#[tokio::test]
async fn test_maintenance_body_kinds() {
    let repo = common::memory_repo();
    let mut scheduler = scheduler(&repo, false);

    let export = JobDescriptor::from_blocking_fn("export", || Ok(JobOutcome::Completed));
    assert!(matches!(export.body(), JobBody::Blocking(_)));
    scheduler
        .register_maintenance("export", Duration::from_secs(60), export.body().clone())
        .unwrap();

    scheduler.start().unwrap();
    assert!(matches!(
        scheduler.register_maintenance("late", Duration::from_secs(60), export.body().clone()),
        Err(SchedulerError::AlreadyRunning)
    ));
    scheduler.stop().unwrap();
}
