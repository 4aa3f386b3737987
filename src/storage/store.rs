//! Deduplicating opportunity store
//!
//! A save commits first; only a genuinely new row schedules a notification.
//! Notification delivery runs on its own task and cannot affect the commit.

use anyhow::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::models::NewOpportunity;
use crate::notifications::{Dispatcher, Notification};
use crate::storage::repository::OpportunityRepository;

/// Result of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New row with its id
    Inserted(i64),
    /// `(source, link)` was already stored
    Duplicate,
}

impl SaveOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Store that deduplicates by `(source, link)` and notifies on new rows
pub struct OpportunityStore {
    repo: Arc<dyn OpportunityRepository>,
    dispatcher: Arc<Dispatcher>,
    pending: Mutex<JoinSet<()>>,
}

impl OpportunityStore {
    pub fn new(repo: Arc<dyn OpportunityRepository>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            repo,
            dispatcher,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Persist an opportunity
    ///
    /// Callable from async tasks and from blocking job bodies alike. Inside a
    /// runtime the notification is delivered in the background; outside one
    /// it is delivered before `save` returns. A missing timestamp is filled
    /// with the current time.
    pub fn save(&self, opportunity: NewOpportunity) -> Result<SaveOutcome> {
        let mut opportunity = opportunity;
        if opportunity.timestamp.is_none() {
            opportunity.timestamp = Some(Utc::now());
        }

        let Some(id) = self.repo.insert_opportunity(&opportunity)? else {
            info!(
                source = %opportunity.source,
                link = %opportunity.link,
                "Opportunity already stored, skipping"
            );
            metrics::record_opportunity(&opportunity.source, false);
            return Ok(SaveOutcome::Duplicate);
        };

        info!(
            id = id,
            source = %opportunity.source,
            title = %opportunity.title,
            "Saved new opportunity"
        );
        metrics::record_opportunity(&opportunity.source, true);

        self.spawn_notification(Notification::new(
            opportunity.source,
            opportunity.title,
            opportunity.link,
            opportunity.snippet,
        ));

        Ok(SaveOutcome::Inserted(id))
    }

    /// Deliver on a throwaway runtime when called outside any runtime
    fn deliver_inline(&self, notification: &Notification) {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                debug!(link = %notification.link, "No async runtime, delivering inline");
                runtime.block_on(self.dispatcher.notify(notification));
            }
            Err(e) => {
                warn!(
                    link = %notification.link,
                    error = %e,
                    "Failed to build runtime, notification dropped"
                );
            }
        }
    }

    fn spawn_notification(&self, notification: Notification) {
        if self.dispatcher.is_empty() {
            debug!(link = %notification.link, "No channels, skipping notification");
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.deliver_inline(&notification);
                return;
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let task = async move {
            dispatcher.notify(&notification).await;
        };

        match self.pending.lock() {
            Ok(mut pending) => {
                // Reap finished deliveries so the set does not grow unbounded
                while pending.try_join_next().is_some() {}
                pending.spawn_on(task, &handle);
            }
            Err(_) => {
                handle.spawn(task);
            }
        }
    }

    /// Wait for every notification scheduled so far
    pub async fn flush_notifications(&self) {
        let mut pending = match self.pending.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };

        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Notification task failed");
            }
        }
    }

    pub fn repository(&self) -> &Arc<dyn OpportunityRepository> {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::SqliteRepository;

    #[tokio::test]
    async fn test_save_fills_timestamp() {
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let store = OpportunityStore::new(repo.clone(), Arc::new(Dispatcher::new()));

        let outcome = store
            .save(NewOpportunity::new("Jiji", "Website", "https://jiji.ug/1", "need a site"))
            .unwrap();
        assert!(outcome.is_inserted());

        let stored = repo.all_opportunities().unwrap();
        assert!(stored[0].timestamp.is_some());
    }

    #[test]
    fn test_save_without_runtime() {
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let store = OpportunityStore::new(repo, Arc::new(Dispatcher::new()));

        let opp = NewOpportunity::new("Jiji", "Website", "https://jiji.ug/1", "s");
        assert!(store.save(opp.clone()).unwrap().is_inserted());
        assert_eq!(store.save(opp).unwrap(), SaveOutcome::Duplicate);
    }
}
