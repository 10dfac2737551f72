//! CatalogStore trait definition.

use super::models::*;
use anyhow::Result;

/// Trait for catalog storage backends.
///
/// Every `resolve_or_create_*` call is atomic: two concurrent calls for the
/// same external id yield the same record and exactly one of them reports
/// `created == true`.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Entity Retrieval
    // =========================================================================

    fn get_artist(&self, id: i64) -> Result<Option<Artist>>;

    fn get_album(&self, id: i64) -> Result<Option<Album>>;

    fn get_track(&self, id: i64) -> Result<Option<Track>>;

    fn find_artist_by_external_id(&self, external_id: &str) -> Result<Option<Artist>>;

    fn find_album_by_external_id(&self, external_id: &str) -> Result<Option<Album>>;

    fn find_track_by_external_id(&self, external_id: &str) -> Result<Option<Track>>;

    /// Album with its credited artists and its tracks in disc/track order.
    fn get_resolved_album(&self, id: i64) -> Result<Option<ResolvedAlbum>>;

    /// Track with its album and credited artists.
    fn get_resolved_track(&self, id: i64) -> Result<Option<ResolvedTrack>>;

    // =========================================================================
    // Listing
    // =========================================================================

    fn list_artists(&self, query: &ListQuery) -> Result<Page<Artist>>;

    fn list_albums(&self, query: &ListQuery) -> Result<Page<Album>>;

    fn list_tracks(&self, query: &ListQuery) -> Result<Page<Track>>;

    // =========================================================================
    // Sync Operations
    // =========================================================================

    /// Look up the artist by external id, creating it from `artist` if absent.
    /// An existing record is returned untouched.
    fn resolve_or_create_artist(&self, artist: &NewArtist) -> Result<Resolution>;

    /// Look up the album by external id, creating it credited to `artist_ids`
    /// if absent.
    fn resolve_or_create_album(&self, album: &NewAlbum, artist_ids: &[i64]) -> Result<Resolution>;

    fn resolve_or_create_track(
        &self,
        track: &NewTrack,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<Resolution>;

    /// All provenance-tagged records of `kind` that carry an external id.
    fn list_synced(&self, kind: EntityKind) -> Result<Vec<SyncedRecord>>;

    /// Overwrite the volatile fields of one record. Returns false if it no
    /// longer exists.
    fn apply_volatile_update(&self, kind: EntityKind, id: i64, update: &VolatileUpdate)
        -> Result<bool>;

    /// Tracks with an external id and no audio features, oldest first.
    fn tracks_missing_audio_features(&self, limit: usize) -> Result<Vec<SyncedRecord>>;

    fn set_audio_features(&self, track_external_id: &str, features: &AudioFeatures)
        -> Result<bool>;

    /// Counts of provenance-tagged records.
    fn count_synced(&self) -> Result<CatalogCounts>;

    /// Counts of every record regardless of provenance.
    fn count_all(&self) -> Result<CatalogCounts>;

    /// Most recent `last_synced` over provenance-tagged artists.
    fn latest_artist_sync(&self) -> Result<Option<i64>>;

    // =========================================================================
    // Curation
    // =========================================================================

    fn create_artist(&self, artist: &NewArtist) -> Result<Artist>;

    fn create_album(&self, album: &NewAlbum, artist_ids: &[i64]) -> Result<Album>;

    fn create_track(
        &self,
        track: &NewTrack,
        artist_ids: &[i64],
        album_id: Option<i64>,
    ) -> Result<Track>;

    /// Apply curated changes. Returns `None` if the artist does not exist.
    fn update_artist(&self, id: i64, update: &ArtistUpdate) -> Result<Option<Artist>>;

    fn update_album(&self, id: i64, update: &AlbumUpdate) -> Result<Option<Album>>;

    fn update_track(&self, id: i64, update: &TrackUpdate) -> Result<Option<Track>>;

    /// Delete an artist along with every album and track that references it.
    fn delete_artist(&self, id: i64) -> Result<bool>;

    /// Delete an album along with its tracks.
    fn delete_album(&self, id: i64) -> Result<bool>;

    fn delete_track(&self, id: i64) -> Result<bool>;

    /// Returns the new play count, or `None` if the track does not exist.
    fn increment_play_count(&self, id: i64) -> Result<Option<i64>>;

    fn set_lyrics(&self, id: i64, lyrics: Option<&str>) -> Result<bool>;
}
