//! JSON export of stored opportunities

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::storage::repository::OpportunityRepository;

/// Default export file name for the current time
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(format!("gigs_export_{}.json", Utc::now().format("%Y%m%d_%H%M%S")))
}

/// Write every opportunity to `path` as a pretty JSON array
///
/// Returns the number of rows written. An empty store writes no file.
pub fn export_json(repo: &dyn OpportunityRepository, path: &Path) -> Result<usize> {
    let opportunities = repo.all_opportunities()?;
    if opportunities.is_empty() {
        tracing::info!("No opportunities to export");
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create export directory: {}", parent.display())
            })?;
        }
    }

    let json = serde_json::to_string_pretty(&opportunities)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        count = opportunities.len(),
        "Exported opportunities"
    );
    Ok(opportunities.len())
}
