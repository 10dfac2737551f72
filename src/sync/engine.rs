//! Reconciliation engine: the search-driven ingestion walk.
//!
//! The walk is an explicit worklist processed level by level
//! (artists' albums, then albums' tracks). Each level is drained through a
//! bounded `buffer_unordered`, so at most `max_concurrent_requests` listing
//! calls are in flight. With a bound of one the walk is fully sequential.

use super::error::SyncError;
use super::mapping;
use super::resolution::{Cached, ResolutionCache};
use super::{SyncOptions, SyncSettings, SyncSummary};
use crate::catalog_api::{CatalogApi, CatalogApiError, RawAlbum, RawArtist, RawTrack};
use crate::catalog_store::{CatalogStore, EntityKind};
use crate::server::metrics;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkItem {
    ArtistAlbums { artist_id: i64, external_id: String },
    AlbumTracks { album_id: i64, external_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Reused,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Reused => "reused",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Per-kind outcome counters for one walk.
#[derive(Default)]
struct WalkStats {
    counters: [[AtomicUsize; 3]; 3],
}

impl WalkStats {
    fn record(&self, kind: EntityKind, outcome: Outcome) {
        let k = match kind {
            EntityKind::Artist => 0,
            EntityKind::Album => 1,
            EntityKind::Track => 2,
        };
        let o = match outcome {
            Outcome::Created => 0,
            Outcome::Reused => 1,
            Outcome::Skipped => 2,
        };
        self.counters[k][o].fetch_add(1, Ordering::Relaxed);
        metrics::record_sync_entity(kind, outcome);
    }

    fn get(&self, kind: usize, outcome: usize) -> usize {
        self.counters[kind][outcome].load(Ordering::Relaxed)
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn CatalogStore>,
    api: Arc<dyn CatalogApi>,
    settings: SyncSettings,
    artists: ResolutionCache,
    albums: ResolutionCache,
    stats: WalkStats,
}

impl ReconciliationEngine {
    /// A fresh engine with empty caches. Build one per reconcile call.
    pub fn new(store: Arc<dyn CatalogStore>, api: Arc<dyn CatalogApi>, settings: SyncSettings) -> Self {
        Self {
            store,
            api,
            settings,
            artists: ResolutionCache::new(),
            albums: ResolutionCache::new(),
            stats: WalkStats::default(),
        }
    }

    pub async fn run(self, query: &str, options: &SyncOptions) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        info!(
            "Reconciling catalog for {:?} (artists {}, albums {}, tracks {}, audio features {})",
            query,
            options.artist_limit,
            options.album_limit,
            options.track_limit,
            options.include_audio_features
        );

        let raw_artists = self
            .api
            .search_artists(query, options.artist_limit)
            .await?;
        debug!("Search for {:?} returned {} artists", query, raw_artists.len());

        let mut queue = Vec::new();
        let mut artists_touched = 0;
        for raw in &raw_artists {
            if let Some((cached, external_id)) = self.resolve_artist(raw).await {
                if cached.first {
                    artists_touched += 1;
                    queue.push(WorkItem::ArtistAlbums {
                        artist_id: cached.resolution.id,
                        external_id,
                    });
                }
            }
        }

        let concurrency = self.settings.max_concurrent_requests.max(1);
        while !queue.is_empty() {
            let level = std::mem::take(&mut queue);
            let children: Vec<Vec<WorkItem>> = stream::iter(level)
                .map(|item| self.process(item, options))
                .buffer_unordered(concurrency)
                .try_collect()
                .await?;
            queue = children.into_iter().flatten().collect();
        }

        if options.include_audio_features {
            self.backfill_audio_features().await?;
        }

        let counts = self.store.count_synced()?;
        info!(
            "Reconcile of {:?} done in {:.1}s: artists {}/{}/{} albums {}/{}/{} tracks {}/{}/{} (created/reused/skipped), {} artists and {} albums resolved",
            query,
            started.elapsed().as_secs_f64(),
            self.stats.get(0, 0),
            self.stats.get(0, 1),
            self.stats.get(0, 2),
            self.stats.get(1, 0),
            self.stats.get(1, 1),
            self.stats.get(1, 2),
            self.stats.get(2, 0),
            self.stats.get(2, 1),
            self.stats.get(2, 2),
            self.artists.len(),
            self.albums.len()
        );
        Ok(SyncSummary {
            artists: artists_touched,
            albums: counts.albums,
            tracks: counts.tracks,
        })
    }

    async fn process(&self, item: WorkItem, options: &SyncOptions) -> Result<Vec<WorkItem>, SyncError> {
        match item {
            WorkItem::ArtistAlbums {
                artist_id,
                external_id,
            } => {
                let Some(albums) = self
                    .list_or_skip(
                        EntityKind::Album,
                        &external_id,
                        self.api.artist_albums(&external_id, options.album_limit),
                    )
                    .await?
                else {
                    return Ok(vec![]);
                };
                debug!(
                    "Artist {} ({}) has {} albums",
                    artist_id,
                    external_id,
                    albums.len()
                );
                let mut next = Vec::new();
                for raw in &albums {
                    next.extend(self.resolve_album(raw).await);
                }
                Ok(next)
            }
            WorkItem::AlbumTracks {
                album_id,
                external_id,
            } => {
                let Some(tracks) = self
                    .list_or_skip(
                        EntityKind::Track,
                        &external_id,
                        self.api.album_tracks(&external_id, options.track_limit),
                    )
                    .await?
                else {
                    return Ok(vec![]);
                };
                debug!("Album {} ({}) has {} tracks", album_id, external_id, tracks.len());
                for raw in &tracks {
                    self.resolve_track(raw, album_id).await;
                }
                Ok(vec![])
            }
        }
    }

    /// A listing failure abandons the parent's subtree, except for
    /// authorization failures which abort the whole operation.
    async fn list_or_skip<T>(
        &self,
        kind: EntityKind,
        parent_external_id: &str,
        listing: impl std::future::Future<Output = Result<Vec<T>, CatalogApiError>>,
    ) -> Result<Option<Vec<T>>, SyncError> {
        match listing.await {
            Ok(items) => Ok(Some(items)),
            Err(e) if e.is_auth() => Err(e.into()),
            Err(e) => {
                warn!(
                    "Skipping {}s of {}: listing failed: {}",
                    kind, parent_external_id, e
                );
                self.stats.record(kind, Outcome::Skipped);
                Ok(None)
            }
        }
    }

    fn record_resolution(&self, kind: EntityKind, cached: &Cached) {
        if !cached.first {
            return;
        }
        let outcome = if cached.resolution.created {
            Outcome::Created
        } else {
            Outcome::Reused
        };
        self.stats.record(kind, outcome);
    }

    async fn resolve_artist(&self, raw: &RawArtist) -> Option<(Cached, String)> {
        let artist = match mapping::map_artist(raw) {
            Ok(artist) => artist,
            Err(e) => {
                warn!("Skipping artist {:?}: {}", raw.name, e);
                self.stats.record(EntityKind::Artist, Outcome::Skipped);
                return None;
            }
        };
        let external_id = artist.external_id.clone()?;
        let resolved = self
            .artists
            .resolve(&external_id, || async {
                self.store.resolve_or_create_artist(&artist)
            })
            .await;
        match resolved {
            Ok(cached) => {
                self.record_resolution(EntityKind::Artist, &cached);
                Some((cached, external_id))
            }
            Err(e) => {
                error!("Failed to store artist {}: {:#}", external_id, e);
                self.stats.record(EntityKind::Artist, Outcome::Skipped);
                None
            }
        }
    }

    /// Resolve credited artists in order, dropping the ones that fail.
    async fn resolve_artist_refs(&self, raw: Option<&[RawArtist]>) -> Vec<i64> {
        let mut ids = Vec::new();
        for artist in raw.unwrap_or_default() {
            if let Some((cached, _)) = self.resolve_artist(artist).await {
                if !ids.contains(&cached.resolution.id) {
                    ids.push(cached.resolution.id);
                }
            }
        }
        ids
    }

    async fn resolve_album(&self, raw: &RawAlbum) -> Option<WorkItem> {
        let album = match mapping::map_album(raw) {
            Ok(album) => album,
            Err(e) => {
                warn!("Skipping album {:?}: {}", raw.name, e);
                self.stats.record(EntityKind::Album, Outcome::Skipped);
                return None;
            }
        };
        let external_id = album.external_id.clone()?;
        let resolved = self
            .albums
            .resolve(&external_id, || async {
                let artist_ids = self.resolve_artist_refs(raw.artists.as_deref()).await;
                self.store.resolve_or_create_album(&album, &artist_ids)
            })
            .await;
        match resolved {
            Ok(cached) => {
                self.record_resolution(EntityKind::Album, &cached);
                cached.first.then_some(WorkItem::AlbumTracks {
                    album_id: cached.resolution.id,
                    external_id,
                })
            }
            Err(e) => {
                error!("Failed to store album {}: {:#}", external_id, e);
                self.stats.record(EntityKind::Album, Outcome::Skipped);
                None
            }
        }
    }

    async fn resolve_track(&self, raw: &RawTrack, album_id: i64) {
        let track = match mapping::map_track(raw) {
            Ok(track) => track,
            Err(e) => {
                warn!("Skipping track {:?}: {}", raw.name, e);
                self.stats.record(EntityKind::Track, Outcome::Skipped);
                return;
            }
        };
        let artist_ids = self.resolve_artist_refs(raw.artists.as_deref()).await;
        match self
            .store
            .resolve_or_create_track(&track, &artist_ids, Some(album_id))
        {
            Ok(resolution) => {
                let outcome = if resolution.created {
                    Outcome::Created
                } else {
                    Outcome::Reused
                };
                self.stats.record(EntityKind::Track, outcome);
            }
            Err(e) => {
                error!("Failed to store track {:?}: {:#}", track.external_id, e);
                self.stats.record(EntityKind::Track, Outcome::Skipped);
            }
        }
    }

    /// Fetch audio features for one batch of tracks that lack them. Returns
    /// the number of tracks updated.
    async fn backfill_audio_features(&self) -> Result<usize, SyncError> {
        let pending = self
            .store
            .tracks_missing_audio_features(self.settings.audio_features_batch_size)?;
        if pending.is_empty() {
            debug!("No tracks are missing audio features");
            return Ok(0);
        }
        let ids: Vec<String> = pending.iter().map(|r| r.external_id.clone()).collect();

        let slots = match self.api.audio_features(&ids).await {
            Ok(slots) => slots,
            Err(e) if e.is_auth() => return Err(e.into()),
            Err(e) => {
                warn!("Audio features batch of {} tracks failed: {}", ids.len(), e);
                return Ok(0);
            }
        };

        // Match by the id echoed in each payload, falling back to position.
        let mut by_id = HashMap::new();
        for (position, slot) in slots.into_iter().enumerate() {
            let Some(raw) = slot else { continue };
            let key = raw.id.clone().or_else(|| ids.get(position).cloned());
            if let Some(key) = key {
                by_id.insert(key, raw);
            }
        }

        let mut updated = 0;
        for external_id in &ids {
            let Some(raw) = by_id.get(external_id) else {
                debug!("No audio features available for track {}", external_id);
                continue;
            };
            let features = match mapping::map_audio_features(raw) {
                Ok(features) => features,
                Err(e) => {
                    warn!("Ignoring audio features of track {}: {}", external_id, e);
                    continue;
                }
            };
            match self.store.set_audio_features(external_id, &features) {
                Ok(true) => updated += 1,
                Ok(false) => debug!("Track {} disappeared before features were stored", external_id),
                Err(e) => error!("Failed to store audio features of {}: {:#}", external_id, e),
            }
        }
        info!(
            "Stored audio features for {} of {} tracks",
            updated,
            ids.len()
        );
        Ok(updated)
    }
}
