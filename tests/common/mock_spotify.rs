//! Fake Spotify Web API
//!
//! Serves the fixture catalog over HTTP with the same paging, auth and
//! error conventions as the real API, so tests exercise the real client.

use super::fixtures::{audio_features, default_catalog, MockCatalogData};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Items per page, kept small so the client has to follow `next`
pub const MOCK_PAGE_SIZE: usize = 2;

const TOKEN_PREFIX: &str = "mock-token-";

#[derive(Default)]
pub struct MockState {
    catalog: Mutex<Option<MockCatalogData>>,
    withheld_features: Mutex<HashSet<String>>,
    garbled_features: Mutex<HashSet<String>>,
    failing_paths: Mutex<HashSet<String>>,
    pub token_requests: AtomicUsize,
    pub api_requests: AtomicUsize,
    pub reject_tokens: AtomicBool,
    pub expire_tokens: AtomicBool,
}

/// Handle to a running fake API
#[derive(Clone)]
pub struct MockSpotify {
    pub api_base_url: String,
    pub token_url: String,
    pub state: Arc<MockState>,
    _shutdown: Arc<tokio::sync::oneshot::Sender<()>>,
}

impl MockSpotify {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        *state.catalog.lock().unwrap() = Some(default_catalog());

        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/search", get(search))
            .route("/v1/artists/{id}", get(get_artist))
            .route("/v1/artists/{id}/albums", get(artist_albums))
            .route("/v1/albums/{id}", get(get_album))
            .route("/v1/albums/{id}/tracks", get(album_tracks))
            .route("/v1/tracks/{id}", get(get_track))
            .route("/v1/audio-features", get(get_audio_features))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock Spotify port");
        let port = listener
            .local_addr()
            .expect("Failed to get mock Spotify address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock Spotify server failed");
        });

        Self {
            api_base_url: format!("http://127.0.0.1:{}/v1", port),
            token_url: format!("http://127.0.0.1:{}/api/token", port),
            state,
            _shutdown: Arc::new(shutdown_tx),
        }
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn api_requests(&self) -> usize {
        self.state.api_requests.load(Ordering::SeqCst)
    }

    pub fn reject_tokens(&self, reject: bool) {
        self.state.reject_tokens.store(reject, Ordering::SeqCst);
    }

    /// Makes every API call answer 401 as if the token expired
    pub fn expire_tokens(&self, expire: bool) {
        self.state.expire_tokens.store(expire, Ordering::SeqCst);
    }

    /// Answer `null` for this track's audio features
    pub fn withhold_features(&self, track_id: &str) {
        self.state
            .withheld_features
            .lock()
            .unwrap()
            .insert(track_id.to_string());
    }

    /// Serve this track's audio features with a tempo of the wrong type
    pub fn garble_features(&self, track_id: &str) {
        self.state
            .garbled_features
            .lock()
            .unwrap()
            .insert(track_id.to_string());
    }

    /// Overwrite one field of an album payload, wherever it is served
    pub fn set_album_field(&self, album_id: &str, field: &str, value: Value) {
        let mut catalog = self.state.catalog.lock().unwrap();
        let catalog = catalog.as_mut().unwrap();
        for album in catalog.albums.iter_mut() {
            if album.album["id"] == album_id {
                album.album[field] = value.clone();
            }
        }
    }

    /// Overwrite one field of a track payload, wherever it is served
    pub fn set_track_field(&self, track_id: &str, field: &str, value: Value) {
        let mut catalog = self.state.catalog.lock().unwrap();
        let catalog = catalog.as_mut().unwrap();
        for track in catalog.albums.iter_mut().flat_map(|a| a.tracks.iter_mut()) {
            if track["id"] == track_id {
                track[field] = value.clone();
            }
        }
    }

    /// Make the given API path (without the /v1 prefix) answer 503
    pub fn fail_path(&self, path: &str) {
        self.state
            .failing_paths
            .lock()
            .unwrap()
            .insert(format!("/v1{}", path));
    }

    /// Change the popularity and follower count served for an artist
    pub fn set_artist_stats(&self, artist_id: &str, popularity: i64, followers: i64) {
        let mut catalog = self.state.catalog.lock().unwrap();
        let catalog = catalog.as_mut().unwrap();
        for artist in catalog.artists.iter_mut() {
            if artist["id"] == artist_id {
                artist["popularity"] = json!(popularity);
                artist["followers"] = json!({ "total": followers });
            }
        }
    }

    /// Replace the name served for an artist
    pub fn rename_artist(&self, artist_id: &str, name: &str) {
        let mut catalog = self.state.catalog.lock().unwrap();
        let catalog = catalog.as_mut().unwrap();
        for artist in catalog.artists.iter_mut() {
            if artist["id"] == artist_id {
                artist["name"] = json!(name);
            }
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "status": status.as_u16(), "message": message } })),
    )
        .into_response()
}

/// Checks the bearer token and the configured failure modes
fn check_request(state: &MockState, headers: &HeaderMap, path: &str) -> Result<(), Response> {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(&format!("Bearer {}", TOKEN_PREFIX)));
    if !authorized || state.expire_tokens.load(Ordering::SeqCst) {
        return Err(error(StatusCode::UNAUTHORIZED, "The access token expired"));
    }
    if state.failing_paths.lock().unwrap().contains(path) {
        return Err(error(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable"));
    }
    Ok(())
}

fn paging(params: &HashMap<String, String>) -> (usize, usize) {
    let limit = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(20usize);
    let offset = params
        .get("offset")
        .and_then(|o| o.parse().ok())
        .unwrap_or(0usize);
    (limit, offset)
}

fn page(items: Vec<Value>, params: &HashMap<String, String>, href: &str) -> Value {
    let (limit, offset) = paging(params);
    let total = items.len();
    let served: Vec<Value> = items
        .into_iter()
        .skip(offset)
        .take(limit.min(MOCK_PAGE_SIZE))
        .collect();
    let next_offset = offset + served.len();
    let next = if !served.is_empty() && next_offset < total {
        json!(format!("{}?offset={}", href, next_offset))
    } else {
        Value::Null
    };
    json!({
        "items": served,
        "total": total,
        "limit": limit,
        "offset": offset,
        "next": next
    })
}

async fn token(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let has_basic = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !has_basic || state.reject_tokens.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_client" })),
        )
            .into_response();
    }
    let n = state.token_requests.load(Ordering::SeqCst);
    Json(json!({
        "access_token": format!("{}{}", TOKEN_PREFIX, n),
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

async fn search(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_request(&state, &headers, "/v1/search") {
        return response;
    }
    let query = params.get("q").cloned().unwrap_or_default().to_lowercase();
    let catalog = state.catalog.lock().unwrap();
    let catalog = catalog.as_ref().unwrap();
    let matches: Vec<Value> = catalog
        .artists
        .iter()
        .filter(|a| {
            let name = a["name"].as_str().unwrap_or_default().to_lowercase();
            let genre_match = a["genres"].as_array().is_some_and(|genres| {
                genres
                    .iter()
                    .any(|g| g.as_str().is_some_and(|g| g.contains(query.as_str())))
            });
            genre_match || query.split_whitespace().all(|word| name.contains(word))
        })
        .cloned()
        .collect();
    Json(json!({ "artists": page(matches, &params, "/v1/search") })).into_response()
}

async fn get_artist(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = check_request(&state, &headers, &format!("/v1/artists/{}", id)) {
        return response;
    }
    let catalog = state.catalog.lock().unwrap();
    match catalog
        .as_ref()
        .unwrap()
        .artists
        .iter()
        .find(|a| a["id"] == id.as_str())
    {
        Some(artist) => Json(artist.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "non existing id"),
    }
}

async fn artist_albums(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let path = format!("/v1/artists/{}/albums", id);
    if let Err(response) = check_request(&state, &headers, &path) {
        return response;
    }
    let catalog = state.catalog.lock().unwrap();
    let albums: Vec<Value> = catalog
        .as_ref()
        .unwrap()
        .albums
        .iter()
        .filter(|a| {
            a.album["artists"]
                .as_array()
                .is_some_and(|artists| artists.iter().any(|artist| artist["id"] == id.as_str()))
        })
        .map(|a| a.album.clone())
        .collect();
    Json(page(albums, &params, &path)).into_response()
}

async fn get_album(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = check_request(&state, &headers, &format!("/v1/albums/{}", id)) {
        return response;
    }
    let catalog = state.catalog.lock().unwrap();
    match catalog
        .as_ref()
        .unwrap()
        .albums
        .iter()
        .find(|a| a.album["id"] == id.as_str())
    {
        Some(album) => Json(album.album.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "non existing id"),
    }
}

async fn album_tracks(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let path = format!("/v1/albums/{}/tracks", id);
    if let Err(response) = check_request(&state, &headers, &path) {
        return response;
    }
    let catalog = state.catalog.lock().unwrap();
    match catalog
        .as_ref()
        .unwrap()
        .albums
        .iter()
        .find(|a| a.album["id"] == id.as_str())
    {
        Some(album) => Json(page(album.tracks.clone(), &params, &path)).into_response(),
        None => error(StatusCode::NOT_FOUND, "non existing id"),
    }
}

async fn get_track(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = check_request(&state, &headers, &format!("/v1/tracks/{}", id)) {
        return response;
    }
    let catalog = state.catalog.lock().unwrap();
    let track = catalog
        .as_ref()
        .unwrap()
        .albums
        .iter()
        .flat_map(|a| a.tracks.iter())
        .find(|t| t["id"] == id.as_str())
        .cloned();
    match track {
        Some(track) => Json(track).into_response(),
        None => error(StatusCode::NOT_FOUND, "non existing id"),
    }
}

async fn get_audio_features(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_request(&state, &headers, "/v1/audio-features") {
        return response;
    }
    let ids = params.get("ids").cloned().unwrap_or_default();
    let ids: Vec<&str> = ids.split(',').filter(|s| !s.is_empty()).collect();
    if ids.len() > 100 {
        return error(StatusCode::BAD_REQUEST, "too many ids requested");
    }
    let withheld = state.withheld_features.lock().unwrap();
    let garbled = state.garbled_features.lock().unwrap();
    let features: Vec<Value> = ids
        .iter()
        .map(|id| {
            if withheld.contains(*id) {
                Value::Null
            } else if garbled.contains(*id) {
                json!({ "id": id, "tempo": "fast" })
            } else {
                audio_features(id)
            }
        })
        .collect();
    Json(json!({ "audio_features": features })).into_response()
}
