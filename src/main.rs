use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gigscout::config::Config;
use gigscout::crawler::{Crawler, PolitenessCache, ResilientFetcher};
use gigscout::error::{Error, GigscoutErrorTrait, Result};
use gigscout::health::HealthMonitor;
use gigscout::jobs::{build_probe_jobs, ExportJob};
use gigscout::notifications::Dispatcher;
use gigscout::scheduler::{JobBody, Lifecycle, Scheduler};
use gigscout::storage::export::{default_export_path, export_json};
use gigscout::storage::{OpportunityRepository, RunLedger, SqliteRepository};
use gigscout::{logging, metrics};

#[derive(Parser)]
#[command(
    name = "gigscout",
    version,
    about = "Polite, resilient scheduler for opportunity-posting scrapers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and run until Ctrl-C
    Run {
        /// Run every enabled job once and exit
        #[arg(long, default_value = "false")]
        once: bool,
    },

    /// Check job health and send alerts
    Health {
        /// Staleness threshold in minutes
        #[arg(short, long)]
        threshold: Option<u64>,
    },

    /// Export stored opportunities as JSON
    Export {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether robots.txt allows a URL
    Robots {
        /// URL to check
        url: String,

        /// User agent to check as
        #[arg(short, long)]
        user_agent: Option<String>,
    },

    /// Show per-job run statistics
    Stats,

    /// Print the metrics exposition
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let log_file = logging::init(&config.logging, cli.verbose, cli.log_format.as_deref())?;
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!(log_file = ?log_file, "gigscout starting");

    let result = match cli.command {
        Commands::Run { once } => run(config, once).await,
        Commands::Health { threshold } => health(config, threshold).await,
        Commands::Export { output } => export(config, output),
        Commands::Robots { url, user_agent } => robots(config, url, user_agent).await,
        Commands::Stats => stats(config),
        Commands::Metrics => print_metrics(),
    };

    if let Err(e) = &result {
        tracing::error!(
            category = e.category().as_str(),
            recoverable = e.is_recoverable(),
            "{e}"
        );
    }
    result.map_err(anyhow::Error::from)
}

fn print_metrics() -> Result<()> {
    let text = metrics::encode_metrics().map_err(|e| Error::Other(anyhow!("{e}")))?;
    print!("{text}");
    Ok(())
}

fn open_repository(config: &Config) -> Result<Arc<SqliteRepository>> {
    let repo = SqliteRepository::new(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.database.sqlite_path.display()
        )
    })?;
    Ok(Arc::new(repo))
}

async fn run(config: Config, once: bool) -> Result<()> {
    let repo = open_repository(&config)?;
    let dispatcher = Arc::new(Dispatcher::from_config(&config.notifications)?);
    let crawler = Crawler::new(&config)?;

    let lifecycle = Arc::new(Lifecycle::from_config(
        repo.clone(),
        repo.clone(),
        &config.scheduler,
    ));
    let mut scheduler = Scheduler::new(lifecycle, &config.scheduler);

    for job in build_probe_jobs(&config, &crawler) {
        scheduler.register(job)?;
    }
    scheduler.registry_mut()?.apply_config(&config);

    let enabled: Vec<String> = scheduler
        .registry()
        .enabled()
        .map(|job| job.name().to_string())
        .collect();
    tracing::info!(jobs = ?enabled, "Jobs enabled");

    if once {
        for (name, status) in scheduler.run_all_once().await {
            println!("{name:<24} {status}");
        }
        return Ok(());
    }

    let monitor = HealthMonitor::from_config(repo.clone(), dispatcher, enabled, &config.health);
    scheduler.register_maintenance(
        "health_monitor",
        config.health_check_interval(),
        JobBody::Async(Arc::new(monitor)),
    )?;

    if config.export.enabled {
        scheduler.register_maintenance(
            "export",
            config.export_interval(),
            JobBody::Blocking(Arc::new(ExportJob::from_config(repo.clone(), &config.export))),
        )?;
    }

    scheduler.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    let drain = Duration::from_secs(config.scheduler.drain_timeout_secs);
    if let Err(e) = scheduler.shutdown(drain).await {
        let err = Error::from(e);
        if err.is_recoverable() {
            tracing::warn!(category = err.category().as_str(), "{err}");
        } else {
            return Err(err);
        }
    }

    tracing::info!("gigscout stopped");
    Ok(())
}

async fn health(config: Config, threshold: Option<u64>) -> Result<()> {
    let repo = open_repository(&config)?;
    let dispatcher = Arc::new(Dispatcher::from_config(&config.notifications)?);
    let jobs = config
        .scraping
        .enabled_scrapers
        .iter()
        .filter(|name| config.is_job_enabled(name))
        .cloned()
        .collect();

    let monitor = HealthMonitor::from_config(repo, dispatcher, jobs, &config.health);
    let threshold = threshold.unwrap_or(monitor.threshold_minutes());
    let alerts = monitor.check_health(threshold).await?;

    if alerts.is_empty() {
        println!("All jobs healthy (threshold {threshold} minutes)");
    }
    for alert in &alerts {
        println!("{:<24} {}", alert.job_name, alert.issue);
    }
    Ok(())
}

fn export(config: Config, output: Option<PathBuf>) -> Result<()> {
    let repo = open_repository(&config)?;
    let path = output.unwrap_or_else(|| default_export_path(&config.export.output_dir));

    let count = export_json(repo.as_ref(), &path)?;
    if count == 0 {
        println!("No opportunities to export");
    } else {
        println!("Exported {count} opportunities to {}", path.display());
    }
    Ok(())
}

async fn robots(config: Config, url: String, user_agent: Option<String>) -> Result<()> {
    let fetcher = Arc::new(ResilientFetcher::from_config(&config)?);
    let cache = PolitenessCache::from_config(fetcher, &config);
    let user_agent = user_agent.unwrap_or_else(|| "*".to_string());

    let allowed = cache.is_allowed(&url, &user_agent).await;
    println!("{url}: {}", if allowed { "allowed" } else { "disallowed" });
    if let Some(delay) = cache.crawl_delay(&url, &user_agent).await {
        println!("Crawl-delay: {}s", delay.as_secs_f64());
    }
    Ok(())
}

fn stats(config: Config) -> Result<()> {
    let repo = open_repository(&config)?;
    let stats = repo.run_stats()?;

    if stats.is_empty() {
        println!("No runs recorded");
    } else {
        println!(
            "{:<24} {:>6} {:>8} {:>7} {:>8} {:>8} {:>9}",
            "job", "runs", "success", "failed", "skipped", "circuit", "avg_secs"
        );
        for s in &stats {
            println!(
                "{:<24} {:>6} {:>8} {:>7} {:>8} {:>8} {:>9.2}",
                s.job_name,
                s.total,
                s.success,
                s.failed,
                s.skipped_robots,
                s.circuit_open,
                s.avg_duration_secs
            );
        }
    }

    println!("Stored opportunities: {}", repo.count_opportunities()?);
    Ok(())
}
