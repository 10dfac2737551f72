//! Refresh pass over previously synced records.

use super::error::SyncError;
use super::mapping;
use crate::catalog_api::{CatalogApi, CatalogApiError};
use crate::catalog_store::{CatalogStore, EntityKind, SyncedRecord, VolatileUpdate};
use crate::server::metrics;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindRefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub artists: KindRefreshSummary,
    pub albums: KindRefreshSummary,
    pub tracks: KindRefreshSummary,
}

impl RefreshSummary {
    pub fn refreshed(&self) -> usize {
        self.artists.refreshed + self.albums.refreshed + self.tracks.refreshed
    }

    pub fn failed(&self) -> usize {
        self.artists.failed + self.albums.failed + self.tracks.failed
    }
}

enum EntityRefresh {
    Refreshed,
    Gone,
    Failed,
}

/// Re-fetches every provenance-tagged record and overwrites its volatile
/// fields. Relationships are never written here.
pub struct RefreshCoordinator {
    store: Arc<dyn CatalogStore>,
    api: Arc<dyn CatalogApi>,
    max_concurrent_requests: usize,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        api: Arc<dyn CatalogApi>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            store,
            api,
            max_concurrent_requests: max_concurrent_requests.max(1),
        }
    }

    pub async fn run(&self) -> Result<RefreshSummary, SyncError> {
        let started = Instant::now();
        let summary = RefreshSummary {
            artists: self.refresh_kind(EntityKind::Artist).await?,
            albums: self.refresh_kind(EntityKind::Album).await?,
            tracks: self.refresh_kind(EntityKind::Track).await?,
        };
        info!(
            "Refresh done in {:.1}s: {} records refreshed, {} failed",
            started.elapsed().as_secs_f64(),
            summary.refreshed(),
            summary.failed()
        );
        Ok(summary)
    }

    async fn refresh_kind(&self, kind: EntityKind) -> Result<KindRefreshSummary, SyncError> {
        let records = self.store.list_synced(kind)?;
        info!("Refreshing {} synced {}s", records.len(), kind);

        let outcomes: Vec<Result<EntityRefresh, SyncError>> = stream::iter(records)
            .map(|record| async move { self.refresh_one(kind, &record).await })
            .buffer_unordered(self.max_concurrent_requests)
            .collect()
            .await;

        let mut summary = KindRefreshSummary::default();
        for outcome in outcomes {
            match outcome? {
                EntityRefresh::Refreshed => {
                    summary.refreshed += 1;
                    metrics::record_refresh_entity(kind, true);
                }
                EntityRefresh::Failed => {
                    summary.failed += 1;
                    metrics::record_refresh_entity(kind, false);
                }
                EntityRefresh::Gone => {}
            }
        }
        Ok(summary)
    }

    async fn fetch_update(
        &self,
        kind: EntityKind,
        external_id: &str,
        synced_at: i64,
    ) -> Result<VolatileUpdate, CatalogApiError> {
        Ok(match kind {
            EntityKind::Artist => mapping::artist_volatile(&self.api.artist(external_id).await?, synced_at),
            EntityKind::Album => mapping::album_volatile(&self.api.album(external_id).await?, synced_at),
            EntityKind::Track => mapping::track_volatile(&self.api.track(external_id).await?, synced_at),
        })
    }

    /// Only authorization failures escape; everything else is counted.
    async fn refresh_one(&self, kind: EntityKind, record: &SyncedRecord) -> Result<EntityRefresh, SyncError> {
        let synced_at = chrono::Utc::now().timestamp();
        let update = match self.fetch_update(kind, &record.external_id, synced_at).await {
            Ok(update) => update,
            Err(e) if e.is_auth() => return Err(e.into()),
            Err(e) => {
                warn!(
                    "Failed to refresh {} {} ({}): {}",
                    kind, record.id, record.external_id, e
                );
                return Ok(EntityRefresh::Failed);
            }
        };
        match self.store.apply_volatile_update(kind, record.id, &update) {
            Ok(true) => {
                debug!("Refreshed {} {} ({:?})", kind, record.id, record.name);
                Ok(EntityRefresh::Refreshed)
            }
            Ok(false) => {
                debug!("{} {} was deleted during refresh", kind, record.id);
                Ok(EntityRefresh::Gone)
            }
            Err(e) => {
                error!("Failed to store refresh of {} {}: {:#}", kind, record.id, e);
                Ok(EntityRefresh::Failed)
            }
        }
    }
}
