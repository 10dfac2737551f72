//! Catalog models persisted by the store.
//!
//! Every entity carries an internal integer id (the SQLite rowid) used for
//! references between entities, plus an optional external id assigned by the
//! catalog API. Records created by a sync carry a provenance tag so they can
//! be told apart from manually curated ones.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance tag written on every record created by the sync engine.
pub const SYNC_SOURCE_SPOTIFY: &str = "spotify";

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Album type classification
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlbumType {
    #[default]
    Album,
    Single,
    Compilation,
}

impl AlbumType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "single" => AlbumType::Single,
            "compilation" => AlbumType::Compilation,
            _ => AlbumType::Album,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlbumType::Album => "album",
            AlbumType::Single => "single",
            AlbumType::Compilation => "compilation",
        }
    }

    /// Parse the catalog API value. "appears_on" and unknown groups map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "album" => Some(AlbumType::Album),
            "single" | "ep" => Some(AlbumType::Single),
            "compilation" => Some(AlbumType::Compilation),
            _ => None,
        }
    }
}

/// How much of `Album::release_date` is meaningful.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseDatePrecision {
    Year,
    Month,
    Day,
}

impl ReleaseDatePrecision {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "year" => Some(ReleaseDatePrecision::Year),
            "month" => Some(ReleaseDatePrecision::Month),
            "day" => Some(ReleaseDatePrecision::Day),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ReleaseDatePrecision::Year => "year",
            ReleaseDatePrecision::Month => "month",
            ReleaseDatePrecision::Day => "day",
        }
    }
}

// =============================================================================
// Value objects
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Copyright {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Acoustic descriptors of a track. Normalized descriptors lie in [0, 1],
/// `key` is a pitch class in 0..=11 (-1 when undetected) and `mode` is 0 or 1.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AudioFeatures {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i32>,
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    pub id: i64,
    pub external_id: Option<String>,
    pub name: String,
    pub images: Vec<Image>,
    pub genres: Vec<String>,
    pub popularity: i32,
    pub followers_total: i64,
    pub sync_source: Option<String>,
    /// Unix seconds of the last sync or refresh touching this record.
    pub last_synced: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Album {
    pub id: i64,
    pub external_id: Option<String>,
    pub name: String,
    pub album_type: AlbumType,
    pub total_tracks: i32,
    pub release_date: Option<String>,
    pub release_date_precision: Option<ReleaseDatePrecision>,
    /// Ordered credited artists.
    pub artist_ids: Vec<i64>,
    pub images: Vec<Image>,
    pub genres: Vec<String>,
    pub label: Option<String>,
    pub copyrights: Vec<Copyright>,
    pub popularity: i32,
    pub sync_source: Option<String>,
    pub last_synced: Option<i64>,
}

impl Album {
    /// Release year parsed from the release date, whatever its precision.
    pub fn release_year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse().ok())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: i64,
    pub external_id: Option<String>,
    pub name: String,
    /// Ordered credited artists. The first one is the primary artist.
    pub artist_ids: Vec<i64>,
    pub album_id: Option<i64>,
    pub duration_ms: i64,
    pub track_number: Option<i32>,
    pub disc_number: i32,
    pub explicit: bool,
    pub preview_url: Option<String>,
    pub popularity: i32,
    pub audio_features: Option<AudioFeatures>,
    pub lyrics: Option<String>,
    pub play_count: i64,
    pub sync_source: Option<String>,
    pub last_synced: Option<i64>,
}

impl Track {
    pub fn duration_seconds(&self) -> i64 {
        self.duration_ms / 1000
    }

    pub fn primary_artist_id(&self) -> Option<i64> {
        self.artist_ids.first().copied()
    }
}

/// Track as exposed to clients of the web player, with the derived fields
/// the player reads directly.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TrackView {
    #[serde(flatten)]
    pub track: Track,
    pub title: String,
    pub artist: Option<i64>,
    pub duration: i64,
    pub duration_seconds: i64,
}

impl From<Track> for TrackView {
    fn from(track: Track) -> Self {
        let duration_seconds = track.duration_seconds();
        TrackView {
            title: track.name.clone(),
            artist: track.primary_artist_id(),
            duration: duration_seconds,
            duration_seconds,
            track,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedAlbum {
    pub album: Album,
    pub artists: Vec<Artist>,
    pub tracks: Vec<TrackView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedTrack {
    pub track: TrackView,
    pub album: Option<Album>,
    pub artists: Vec<Artist>,
}

// =============================================================================
// Write payloads
// =============================================================================

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NewArtist {
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: i32,
    #[serde(default)]
    pub followers_total: i64,
    #[serde(skip)]
    pub sync_source: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NewAlbum {
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub album_type: AlbumType,
    #[serde(default)]
    pub total_tracks: i32,
    pub release_date: Option<String>,
    pub release_date_precision: Option<ReleaseDatePrecision>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub label: Option<String>,
    #[serde(default)]
    pub copyrights: Vec<Copyright>,
    #[serde(default)]
    pub popularity: i32,
    #[serde(skip)]
    pub sync_source: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NewTrack {
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: i64,
    pub track_number: Option<i32>,
    #[serde(default = "default_disc_number")]
    pub disc_number: i32,
    #[serde(default)]
    pub explicit: bool,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub popularity: i32,
    #[serde(skip)]
    pub sync_source: Option<String>,
}

fn default_disc_number() -> i32 {
    1
}

/// Curated changes to an artist. Absent fields keep their stored value.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArtistUpdate {
    pub name: Option<String>,
    pub genres: Option<Vec<String>>,
    pub images: Option<Vec<Image>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AlbumUpdate {
    pub name: Option<String>,
    pub album_type: Option<AlbumType>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<ReleaseDatePrecision>,
    pub label: Option<String>,
    pub genres: Option<Vec<String>>,
    pub images: Option<Vec<Image>>,
    /// Replaces the credited artists, in order.
    pub artist_ids: Option<Vec<i64>>,
}

/// Curated changes to a track. `title`, `artist` and `duration` are
/// projections of `name`, `artist_ids` and `duration_ms` and cannot be
/// written directly.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TrackUpdate {
    pub name: Option<String>,
    pub duration_ms: Option<i64>,
    pub track_number: Option<i32>,
    pub disc_number: Option<i32>,
    pub explicit: Option<bool>,
    pub preview_url: Option<String>,
    pub artist_ids: Option<Vec<i64>>,
    pub album_id: Option<i64>,
}

/// Outcome of an atomic resolve-or-create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub id: i64,
    pub created: bool,
}

/// Minimal view of a synced record, used by the refresh pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncedRecord {
    pub id: i64,
    pub external_id: String,
    pub name: String,
}

/// Fields the refresh pass is allowed to overwrite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolatileUpdate {
    pub popularity: Option<i32>,
    pub followers_total: Option<i64>,
    pub synced_at: i64,
}

// =============================================================================
// Listing
// =============================================================================

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Name,
    PopularityDesc,
    ReleaseDateDesc,
    /// Disc then track number. Only meaningful for tracks.
    AlbumPosition,
    PlayCountDesc,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    /// Only records with popularity above zero.
    pub popular_only: bool,
    pub sort: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct CatalogCounts {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}
