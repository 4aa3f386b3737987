//! Periodic JSON export as a blocking job

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::scheduler::{BlockingJob, JobOutcome};
use crate::storage::export::{default_export_path, export_json};
use crate::storage::repository::OpportunityRepository;

/// Writes a timestamped export file into `output_dir` on every run
pub struct ExportJob {
    repo: Arc<dyn OpportunityRepository>,
    output_dir: PathBuf,
}

impl ExportJob {
    pub fn new(repo: Arc<dyn OpportunityRepository>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(repo: Arc<dyn OpportunityRepository>, config: &ExportConfig) -> Self {
        Self::new(repo, config.output_dir.clone())
    }
}

impl BlockingJob for ExportJob {
    fn run(&self) -> anyhow::Result<JobOutcome> {
        let path = default_export_path(&self.output_dir);
        export_json(self.repo.as_ref(), &path)?;
        Ok(JobOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOpportunity;
    use crate::storage::repository::SqliteRepository;

    #[test]
    fn test_export_job_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        repo.insert_opportunity(&NewOpportunity::new("Gumtree", "Logo", "http://g/1", "s"))
            .unwrap();

        let job = ExportJob::new(repo, dir.path());
        assert_eq!(job.run().unwrap(), JobOutcome::Completed);

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
