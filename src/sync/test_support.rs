//! In-memory catalog API used by the sync tests.

use crate::catalog_api::{
    CatalogApi, CatalogApiError, RawAlbum, RawArtist, RawAudioFeatures, RawFollowers, RawTrack,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn artist(id: &str, name: &str) -> RawArtist {
    RawArtist {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        genres: Some(vec!["pop".to_string()]),
        popularity: Some(50),
        followers: Some(RawFollowers { total: Some(1000) }),
        ..Default::default()
    }
}

fn credit(id: &str) -> RawArtist {
    RawArtist {
        id: Some(id.to_string()),
        name: Some(id.to_string()),
        ..Default::default()
    }
}

pub fn album(id: &str, name: &str, artists: &[&str]) -> RawAlbum {
    RawAlbum {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        album_type: Some("album".to_string()),
        release_date: Some("2017-03-03".to_string()),
        release_date_precision: Some("day".to_string()),
        artists: Some(artists.iter().map(|a| credit(a)).collect()),
        popularity: Some(40),
        ..Default::default()
    }
}

pub fn track(id: &str, name: &str, artists: &[&str]) -> RawTrack {
    RawTrack {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        artists: Some(artists.iter().map(|a| credit(a)).collect()),
        duration_ms: Some(200_000),
        track_number: Some(1),
        disc_number: Some(1),
        popularity: Some(30),
        ..Default::default()
    }
}

fn features(id: &str) -> RawAudioFeatures {
    RawAudioFeatures {
        id: Some(id.to_string()),
        danceability: Some(0.5),
        energy: Some(0.7),
        key: Some(5),
        loudness: Some(-6.0),
        mode: Some(1),
        speechiness: Some(0.05),
        acousticness: Some(0.2),
        instrumentalness: Some(0.0),
        liveness: Some(0.1),
        valence: Some(0.6),
        tempo: Some(120.0),
        time_signature: Some(4),
    }
}

#[derive(Default)]
struct State {
    search: HashMap<String, Vec<RawArtist>>,
    search_error: Option<CatalogApiError>,
    token_error: Option<CatalogApiError>,
    albums_of: HashMap<String, Result<Vec<RawAlbum>, CatalogApiError>>,
    tracks_of: HashMap<String, Vec<RawTrack>>,
    artists: HashMap<String, RawArtist>,
    albums: HashMap<String, RawAlbum>,
    tracks: HashMap<String, RawTrack>,
    lookup_errors: HashMap<String, CatalogApiError>,
    withheld_features: HashSet<String>,
    track_listings: HashMap<String, usize>,
    lookups: HashMap<String, usize>,
    token_requests: usize,
}

/// Answers from registered fixtures. Every entity registered through a
/// listing is also available to the single-entity lookups.
#[derive(Default)]
pub struct FakeCatalogApi {
    state: Mutex<State>,
}

impl FakeCatalogApi {
    pub fn add_search(&self, query: &str, artists: Vec<RawArtist>) {
        let mut state = self.state.lock().unwrap();
        for a in &artists {
            if let Some(id) = &a.id {
                state.artists.insert(id.clone(), a.clone());
            }
        }
        state.search.insert(query.to_string(), artists);
    }

    pub fn fail_search(&self, err: CatalogApiError) {
        self.state.lock().unwrap().search_error = Some(err);
    }

    pub fn fail_token(&self, err: CatalogApiError) {
        self.state.lock().unwrap().token_error = Some(err);
    }

    pub fn add_albums(&self, artist_id: &str, albums: Vec<RawAlbum>) {
        let mut state = self.state.lock().unwrap();
        for a in &albums {
            if let Some(id) = &a.id {
                state.albums.insert(id.clone(), a.clone());
            }
        }
        state.albums_of.insert(artist_id.to_string(), Ok(albums));
    }

    pub fn fail_albums(&self, artist_id: &str, err: CatalogApiError) {
        self.state
            .lock()
            .unwrap()
            .albums_of
            .insert(artist_id.to_string(), Err(err));
    }

    pub fn add_tracks(&self, album_id: &str, tracks: Vec<RawTrack>) {
        let mut state = self.state.lock().unwrap();
        for t in &tracks {
            if let Some(id) = &t.id {
                state.tracks.insert(id.clone(), t.clone());
            }
        }
        state.tracks_of.insert(album_id.to_string(), tracks);
    }

    /// Replace what single-entity lookups return for an artist.
    pub fn set_artist(&self, raw: RawArtist) {
        if let Some(id) = raw.id.clone() {
            self.state.lock().unwrap().artists.insert(id, raw);
        }
    }

    pub fn set_track(&self, raw: RawTrack) {
        if let Some(id) = raw.id.clone() {
            self.state.lock().unwrap().tracks.insert(id, raw);
        }
    }

    pub fn fail_lookup(&self, id: &str, err: CatalogApiError) {
        self.state
            .lock()
            .unwrap()
            .lookup_errors
            .insert(id.to_string(), err);
    }

    pub fn withhold_features(&self, track_id: &str) {
        self.state
            .lock()
            .unwrap()
            .withheld_features
            .insert(track_id.to_string());
    }

    pub fn track_listings(&self, album_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .track_listings
            .get(album_id)
            .copied()
            .unwrap_or(0)
    }

    /// Single-entity lookups made for `id`.
    pub fn lookups(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .lookups
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests
    }

    fn lookup<T: Clone>(
        &self,
        id: &str,
        pick: impl FnOnce(&State) -> Option<&T>,
    ) -> Result<T, CatalogApiError> {
        let mut state = self.state.lock().unwrap();
        *state.lookups.entry(id.to_string()).or_default() += 1;
        if let Some(err) = state.lookup_errors.get(id) {
            return Err(err.clone());
        }
        pick(&state)
            .cloned()
            .ok_or_else(|| CatalogApiError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl CatalogApi for FakeCatalogApi {
    async fn ensure_token(&self) -> Result<(), CatalogApiError> {
        let mut state = self.state.lock().unwrap();
        state.token_requests += 1;
        match &state.token_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<RawArtist>, CatalogApiError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.search_error {
            return Err(err.clone());
        }
        let mut found = state.search.get(query).cloned().unwrap_or_default();
        found.truncate(limit);
        Ok(found)
    }

    async fn artist_albums(&self, artist_id: &str, limit: usize) -> Result<Vec<RawAlbum>, CatalogApiError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        match state.albums_of.get(artist_id) {
            Some(Ok(albums)) => Ok(albums.iter().take(limit).cloned().collect()),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(vec![]),
        }
    }

    async fn album_tracks(&self, album_id: &str, limit: usize) -> Result<Vec<RawTrack>, CatalogApiError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        *state.track_listings.entry(album_id.to_string()).or_default() += 1;
        Ok(state
            .tracks_of
            .get(album_id)
            .map(|tracks| tracks.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogApiError> {
        self.lookup(id, |s| s.artists.get(id))
    }

    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogApiError> {
        self.lookup(id, |s| s.albums.get(id))
    }

    async fn track(&self, id: &str) -> Result<RawTrack, CatalogApiError> {
        self.lookup(id, |s| s.tracks.get(id))
    }

    async fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<RawAudioFeatures>>, CatalogApiError> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .map(|id| (!state.withheld_features.contains(id)).then(|| features(id)))
            .collect())
    }
}
