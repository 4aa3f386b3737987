//! Persistence: SQLite ledgers, the deduplicating store and export
//!
//! One SQLite file holds three tables: `opportunities` (unique on
//! `(source, link)`), `scraper_health` (last success per job) and
//! `scraper_performance` (one row per job run).

pub mod export;
pub mod repository;
pub mod store;

pub use repository::{HealthLedger, OpportunityRepository, RunLedger, SqliteRepository};
pub use store::{OpportunityStore, SaveOutcome};
