//! External music catalog API.

mod error;
mod models;
mod spotify;

pub use error::CatalogApiError;
pub use models::*;
pub use spotify::{
    SpotifyClient, SpotifyClientConfig, MAX_AUDIO_FEATURES_IDS, SPOTIFY_API_BASE,
    SPOTIFY_TOKEN_URL,
};

use async_trait::async_trait;

/// Read access to an external music catalog.
///
/// Listing calls return at most `limit` items. `audio_features` returns one
/// slot per requested id, in request order, `None` where the catalog has no
/// data for that id.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Acquire an access token unless a fresh one is already held.
    async fn ensure_token(&self) -> Result<(), CatalogApiError>;

    async fn search_artists(&self, query: &str, limit: usize)
        -> Result<Vec<RawArtist>, CatalogApiError>;

    async fn artist_albums(&self, artist_id: &str, limit: usize)
        -> Result<Vec<RawAlbum>, CatalogApiError>;

    async fn album_tracks(&self, album_id: &str, limit: usize)
        -> Result<Vec<RawTrack>, CatalogApiError>;

    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogApiError>;

    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogApiError>;

    async fn track(&self, id: &str) -> Result<RawTrack, CatalogApiError>;

    async fn audio_features(&self, ids: &[String])
        -> Result<Vec<Option<RawAudioFeatures>>, CatalogApiError>;
}
