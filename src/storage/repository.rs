//! Repository Pattern for Database Abstraction
//!
//! Trait-based ledgers decouple the lifecycle wrapper, health monitor and
//! store from SQLite so tests can swap in their own implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │   Lifecycle          HealthMonitor        OpportunityStore   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                     │
//!          ▼                   ▼                     ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌──────────────────────┐
//! │   RunLedger     │ │  HealthLedger   │ │ OpportunityRepository│
//! └─────────────────┘ └─────────────────┘ └──────────────────────┘
//!          └───────────────────┼─────────────────────┘
//!                              ▼
//!                    ┌───────────────────┐
//!                    │  SqliteRepository │
//!                    └───────────────────┘
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{HealthRecord, NewOpportunity, Opportunity, RunRecord, RunStats, RunStatus};

// ============================================================================
// Repository Traits
// ============================================================================

/// Append-only performance ledger
pub trait RunLedger: Send + Sync {
    /// Append one run record
    fn record_run(&self, record: &RunRecord) -> Result<()>;

    /// Most recent runs of a job, newest first
    fn runs_for(&self, job_name: &str, limit: usize) -> Result<Vec<RunRecord>>;

    /// Per-job aggregates, ordered by job name
    fn run_stats(&self) -> Result<Vec<RunStats>>;
}

/// Last-success ledger, one row per job
pub trait HealthLedger: Send + Sync {
    /// Upsert the last successful run of a job
    fn record_success(&self, job_name: &str, at: DateTime<Utc>) -> Result<()>;

    /// Health row for one job
    fn health_for(&self, job_name: &str) -> Result<Option<HealthRecord>>;

    /// Every health row, ordered by job name
    fn health_records(&self) -> Result<Vec<HealthRecord>>;
}

/// Opportunity persistence with `(source, link)` uniqueness
pub trait OpportunityRepository: Send + Sync {
    /// Insert unless `(source, link)` exists; returns the new row id
    fn insert_opportunity(&self, opportunity: &NewOpportunity) -> Result<Option<i64>>;

    /// Every stored opportunity, oldest first
    fn all_opportunities(&self) -> Result<Vec<Opportunity>>;

    /// Total stored opportunities
    fn count_opportunities(&self) -> Result<usize>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of every ledger
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort as text
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl SqliteRepository {
    /// Open (or create) a repository file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // WAL lets readers proceed while a job is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS opportunities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source TEXT NOT NULL,
                    title TEXT NOT NULL,
                    link TEXT NOT NULL,
                    snippet TEXT NOT NULL,
                    price TEXT,
                    full_description TEXT,
                    timestamp TEXT,
                    contact_info TEXT,
                    category TEXT,
                    UNIQUE(source, link)
                );

                CREATE TABLE IF NOT EXISTS scraper_health (
                    job_name TEXT PRIMARY KEY,
                    last_run TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS scraper_performance (
                    job_name TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    duration REAL NOT NULL,
                    status TEXT NOT NULL,
                    error_message TEXT,
                    PRIMARY KEY (job_name, timestamp)
                );

                CREATE INDEX IF NOT EXISTS idx_performance_status
                    ON scraper_performance(status);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn row_to_opportunity(row: &Row<'_>) -> rusqlite::Result<Opportunity> {
        let timestamp: Option<String> = row.get(7)?;
        Ok(Opportunity {
            id: row.get(0)?,
            source: row.get(1)?,
            title: row.get(2)?,
            link: row.get(3)?,
            snippet: row.get(4)?,
            price: row.get(5)?,
            full_description: row.get(6)?,
            timestamp: timestamp.as_deref().map(parse_ts).transpose()?,
            contact_info: row.get(8)?,
            category: row.get(9)?,
        })
    }

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        let status: String = row.get(3)?;
        Ok(RunRecord {
            job_name: row.get(0)?,
            started_at: parse_ts(&row.get::<_, String>(1)?)?,
            duration_secs: row.get(2)?,
            status: RunStatus::from_str(&status).unwrap_or(RunStatus::Failed),
            error_message: row.get(4)?,
        })
    }
}

impl RunLedger for SqliteRepository {
    fn record_run(&self, record: &RunRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT INTO scraper_performance (job_name, timestamp, duration, status, error_message)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            params![
                record.job_name,
                format_ts(record.started_at),
                record.duration_secs,
                record.status.as_str(),
                record.error_message,
            ],
        )
        .context("Failed to record run")?;

        Ok(())
    }

    fn runs_for(&self, job_name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_name, timestamp, duration, status, error_message
             FROM scraper_performance WHERE job_name = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;

        let runs = stmt
            .query_map(params![job_name, limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read run records")?;

        Ok(runs)
    }

    fn run_stats(&self) -> Result<Vec<RunStats>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT job_name, status, COUNT(*), SUM(duration), MAX(timestamp)
             FROM scraper_performance GROUP BY job_name, status",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut by_job: BTreeMap<String, (RunStats, f64)> = BTreeMap::new();
        for (job_name, status, count, duration_sum, last) in rows {
            let entry = by_job.entry(job_name.clone()).or_insert_with(|| {
                (
                    RunStats {
                        job_name,
                        ..Default::default()
                    },
                    0.0,
                )
            });

            let status = RunStatus::from_str(&status).unwrap_or(RunStatus::Failed);
            entry.0.add(status, count as usize);
            entry.1 += duration_sum;

            let last = parse_ts(&last)?;
            if entry.0.last_started_at.map_or(true, |prev| last > prev) {
                entry.0.last_started_at = Some(last);
            }
        }

        Ok(by_job
            .into_values()
            .map(|(mut stats, duration_sum)| {
                if stats.total > 0 {
                    stats.avg_duration_secs = duration_sum / stats.total as f64;
                }
                stats
            })
            .collect())
    }
}

impl HealthLedger for SqliteRepository {
    fn record_success(&self, job_name: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT INTO scraper_health (job_name, last_run) VALUES (?1, ?2)
                ON CONFLICT(job_name) DO UPDATE SET last_run = excluded.last_run
                "#,
            params![job_name, format_ts(at)],
        )
        .context("Failed to update health")?;

        Ok(())
    }

    fn health_for(&self, job_name: &str) -> Result<Option<HealthRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT job_name, last_run FROM scraper_health WHERE job_name = ?1",
                params![job_name],
                |row| {
                    Ok(HealthRecord {
                        job_name: row.get(0)?,
                        last_run: parse_ts(&row.get::<_, String>(1)?)?,
                    })
                },
            )
            .optional()
            .context("Failed to get health record")?;

        Ok(record)
    }

    fn health_records(&self) -> Result<Vec<HealthRecord>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT job_name, last_run FROM scraper_health ORDER BY job_name")?;

        let records = stmt
            .query_map([], |row| {
                Ok(HealthRecord {
                    job_name: row.get(0)?,
                    last_run: parse_ts(&row.get::<_, String>(1)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read health records")?;

        Ok(records)
    }
}

impl OpportunityRepository for SqliteRepository {
    fn insert_opportunity(&self, opportunity: &NewOpportunity) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO opportunities
                    (source, title, link, snippet, price, full_description, timestamp, contact_info, category)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    opportunity.source,
                    opportunity.title,
                    opportunity.link,
                    opportunity.snippet,
                    opportunity.price,
                    opportunity.full_description,
                    opportunity.timestamp.map(format_ts),
                    opportunity.contact_info,
                    opportunity.category,
                ],
            )
            .context("Failed to insert opportunity")?;

        Ok((inserted > 0).then(|| conn.last_insert_rowid()))
    }

    fn all_opportunities(&self) -> Result<Vec<Opportunity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, title, link, snippet, price, full_description, timestamp,
                    contact_info, category
             FROM opportunities ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], Self::row_to_opportunity)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read opportunities")?;

        Ok(rows)
    }

    fn count_opportunities(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// Tests
// ============================================================================
