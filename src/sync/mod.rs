//! Catalog synchronization: search-driven reconciliation and the refresh
//! pass, on top of a [`CatalogStore`] and a [`CatalogApi`].

mod engine;
mod error;
pub mod mapping;
mod refresh;
mod resolution;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{Outcome, ReconciliationEngine};
pub use error::SyncError;
pub use mapping::MappingError;
pub use refresh::{KindRefreshSummary, RefreshCoordinator, RefreshSummary};

use crate::catalog_api::{CatalogApi, MAX_AUDIO_FEATURES_IDS};
use crate::catalog_store::CatalogStore;
use crate::server::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Upper bound accepted for any of the per-call limits.
pub const MAX_SYNC_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub artist_limit: usize,
    pub album_limit: usize,
    pub track_limit: usize,
    pub include_audio_features: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            artist_limit: 20,
            album_limit: 50,
            track_limit: 50,
            include_audio_features: true,
        }
    }
}

/// Caller-supplied options; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptionsOverride {
    pub artist_limit: Option<usize>,
    pub album_limit: Option<usize>,
    pub track_limit: Option<usize>,
    pub include_audio_features: Option<bool>,
}

impl SyncOptionsOverride {
    pub fn apply(&self, defaults: &SyncOptions) -> SyncOptions {
        SyncOptions {
            artist_limit: self.artist_limit.unwrap_or(defaults.artist_limit),
            album_limit: self.album_limit.unwrap_or(defaults.album_limit),
            track_limit: self.track_limit.unwrap_or(defaults.track_limit),
            include_audio_features: self
                .include_audio_features
                .unwrap_or(defaults.include_audio_features),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub max_concurrent_requests: usize,
    pub audio_features_batch_size: usize,
    pub default_options: SyncOptions,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 1,
            audio_features_batch_size: MAX_AUDIO_FEATURES_IDS,
            default_options: SyncOptions::default(),
        }
    }
}

/// Artists touched by one call, plus total synced albums and tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub last_sync: Option<i64>,
}

pub struct SyncService {
    store: Arc<dyn CatalogStore>,
    api: Arc<dyn CatalogApi>,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(store: Arc<dyn CatalogStore>, api: Arc<dyn CatalogApi>, settings: SyncSettings) -> Self {
        Self {
            store,
            api,
            settings,
        }
    }

    pub fn default_options(&self) -> &SyncOptions {
        &self.settings.default_options
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    fn validate(query: &str, options: &SyncOptions) -> Result<(), SyncError> {
        if query.trim().is_empty() {
            return Err(SyncError::InvalidRequest("query must not be empty".to_string()));
        }
        for (name, value) in [
            ("artistLimit", options.artist_limit),
            ("albumLimit", options.album_limit),
            ("trackLimit", options.track_limit),
        ] {
            if value == 0 || value > MAX_SYNC_LIMIT {
                return Err(SyncError::InvalidRequest(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_SYNC_LIMIT, value
                )));
            }
        }
        Ok(())
    }

    /// Walk the external catalog from the artists matching `query`.
    pub async fn reconcile(&self, query: &str, options: &SyncOptions) -> Result<SyncSummary, SyncError> {
        Self::validate(query, options)?;
        let started = Instant::now();
        let result = self.reconcile_validated(query.trim(), options).await;
        metrics::record_sync_operation("reconcile", result.is_ok(), started.elapsed());
        result
    }

    async fn reconcile_validated(&self, query: &str, options: &SyncOptions) -> Result<SyncSummary, SyncError> {
        self.api.ensure_token().await?;
        let summary = ReconciliationEngine::new(self.store.clone(), self.api.clone(), self.settings.clone())
            .run(query, options)
            .await?;
        metrics::record_catalog_counts(&self.store.count_all()?);
        Ok(summary)
    }

    /// Overwrite the volatile fields of every synced record.
    pub async fn refresh(&self) -> Result<RefreshSummary, SyncError> {
        let started = Instant::now();
        let result = match self.api.ensure_token().await {
            Ok(()) => {
                RefreshCoordinator::new(
                    self.store.clone(),
                    self.api.clone(),
                    self.settings.max_concurrent_requests,
                )
                .run()
                .await
            }
            Err(e) => Err(e.into()),
        };
        metrics::record_sync_operation("refresh", result.is_ok(), started.elapsed());
        result
    }

    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        let counts = self.store.count_synced()?;
        let last_sync = self.store.latest_artist_sync()?;
        info!(
            "Sync status: {} artists, {} albums, {} tracks",
            counts.artists, counts.albums, counts.tracks
        );
        Ok(SyncStatus {
            artists: counts.artists,
            albums: counts.albums,
            tracks: counts.tracks,
            last_sync,
        })
    }
}
