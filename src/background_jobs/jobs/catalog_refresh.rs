//! Periodic refresh of synced catalog records.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Re-fetches popularity and follower counts for every synced record.
pub struct CatalogRefreshJob {
    interval: Duration,
}

impl CatalogRefreshJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn every_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours.max(1) * 60 * 60))
    }
}

#[async_trait]
impl BackgroundJob for CatalogRefreshJob {
    fn id(&self) -> &'static str {
        "catalog_refresh"
    }

    fn name(&self) -> &'static str {
        "Catalog Refresh"
    }

    fn description(&self) -> &'static str {
        "Refresh popularity and follower counts of synced artists, albums and tracks"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let summary = ctx
            .sync_service
            .refresh()
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Catalog refresh job: {} refreshed, {} failed",
            summary.refreshed(),
            summary.failed()
        );
        Ok(())
    }
}
