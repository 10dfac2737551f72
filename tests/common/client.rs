//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all catalog-sync-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client, optionally sending the admin bearer token
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    token: Option<String>,
}

impl TestClient {
    /// Creates a client without credentials
    ///
    /// Mutating routes answer 403 to this client.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client sending the admin token on every request
    pub fn admin(base_url: String) -> Self {
        Self::with_token(base_url, ADMIN_TOKEN)
    }

    pub fn with_token(base_url: String, token: &str) -> Self {
        let mut client = Self::new(base_url);
        client.token = Some(token.to_string());
        client
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, path: &str) -> Response {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Response {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.authorize(request)
            .send()
            .await
            .expect("POST request failed")
    }

    async fn put(&self, path: &str, body: Value) -> Response {
        self.authorize(self.client.put(format!("{}{}", self.base_url, path)).json(&body))
            .send()
            .await
            .expect("PUT request failed")
    }

    async fn delete(&self, path: &str) -> Response {
        self.authorize(self.client.delete(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("DELETE request failed")
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// GET /v1/health
    pub async fn health(&self) -> Response {
        self.get("/v1/health").await
    }

    // ========================================================================
    // Sync Endpoints
    // ========================================================================

    /// POST /v1/sync/sync with default options
    pub async fn sync(&self, query: &str) -> Response {
        self.post("/v1/sync/sync", Some(json!({ "query": query })))
            .await
    }

    /// POST /v1/sync/sync with explicit options
    pub async fn sync_with_options(&self, query: &str, options: Value) -> Response {
        self.post(
            "/v1/sync/sync",
            Some(json!({ "query": query, "options": options })),
        )
        .await
    }

    /// POST /v1/sync/refresh
    pub async fn refresh(&self) -> Response {
        self.post("/v1/sync/refresh", None).await
    }

    /// GET /v1/sync/status
    pub async fn sync_status(&self) -> Response {
        self.get("/v1/sync/status").await
    }

    // ========================================================================
    // Artist Endpoints
    // ========================================================================

    /// GET /v1/artists with a raw query string (e.g. "page=1&limit=5")
    pub async fn list_artists(&self, query: &str) -> Response {
        self.get(&format!("/v1/artists?{}", query)).await
    }

    /// GET /v1/artists/popular
    pub async fn popular_artists(&self) -> Response {
        self.get("/v1/artists/popular").await
    }

    /// GET /v1/artists/genre/{genre}
    pub async fn artists_by_genre(&self, genre: &str) -> Response {
        self.get(&format!("/v1/artists/genre/{}", genre)).await
    }

    /// GET /v1/artists/{id}
    pub async fn get_artist(&self, id: i64) -> Response {
        self.get(&format!("/v1/artists/{}", id)).await
    }

    /// GET /v1/artists/external/{external_id}
    pub async fn get_artist_by_external_id(&self, external_id: &str) -> Response {
        self.get(&format!("/v1/artists/external/{}", external_id))
            .await
    }

    /// GET /v1/artists/{id}/albums
    pub async fn get_artist_albums(&self, id: i64) -> Response {
        self.get(&format!("/v1/artists/{}/albums", id)).await
    }

    /// GET /v1/artists/{id}/top-tracks
    pub async fn get_artist_top_tracks(&self, id: i64) -> Response {
        self.get(&format!("/v1/artists/{}/top-tracks", id)).await
    }

    /// POST /v1/artists
    pub async fn create_artist(&self, body: Value) -> Response {
        self.post("/v1/artists", Some(body)).await
    }

    /// PUT /v1/artists/{id}
    pub async fn update_artist(&self, id: i64, body: Value) -> Response {
        self.put(&format!("/v1/artists/{}", id), body).await
    }

    /// DELETE /v1/artists/{id}
    pub async fn delete_artist(&self, id: i64) -> Response {
        self.delete(&format!("/v1/artists/{}", id)).await
    }

    // ========================================================================
    // Album Endpoints
    // ========================================================================

    /// GET /v1/albums with a raw query string
    pub async fn list_albums(&self, query: &str) -> Response {
        self.get(&format!("/v1/albums?{}", query)).await
    }

    /// GET /v1/albums/year/{year}
    pub async fn albums_by_year(&self, year: i32) -> Response {
        self.get(&format!("/v1/albums/year/{}", year)).await
    }

    /// GET /v1/albums/genre/{genre}
    pub async fn albums_by_genre(&self, genre: &str) -> Response {
        self.get(&format!("/v1/albums/genre/{}", genre)).await
    }

    /// GET /v1/albums/{id}
    pub async fn get_album(&self, id: i64) -> Response {
        self.get(&format!("/v1/albums/{}", id)).await
    }

    /// GET /v1/albums/external/{external_id}
    pub async fn get_album_by_external_id(&self, external_id: &str) -> Response {
        self.get(&format!("/v1/albums/external/{}", external_id))
            .await
    }

    /// GET /v1/albums/{id}/tracks
    pub async fn get_album_tracks(&self, id: i64) -> Response {
        self.get(&format!("/v1/albums/{}/tracks", id)).await
    }

    /// POST /v1/albums
    pub async fn create_album(&self, body: Value) -> Response {
        self.post("/v1/albums", Some(body)).await
    }

    /// PUT /v1/albums/{id}
    pub async fn update_album(&self, id: i64, body: Value) -> Response {
        self.put(&format!("/v1/albums/{}", id), body).await
    }

    /// DELETE /v1/albums/{id}
    pub async fn delete_album(&self, id: i64) -> Response {
        self.delete(&format!("/v1/albums/{}", id)).await
    }

    // ========================================================================
    // Track Endpoints
    // ========================================================================

    /// GET /v1/tracks with a raw query string
    pub async fn list_tracks(&self, query: &str) -> Response {
        self.get(&format!("/v1/tracks?{}", query)).await
    }

    /// GET /v1/tracks/popular
    pub async fn popular_tracks(&self) -> Response {
        self.get("/v1/tracks/popular").await
    }

    /// GET /v1/tracks/search?q=...
    pub async fn search_tracks(&self, q: &str) -> Response {
        self.get(&format!("/v1/tracks/search?q={}", urlencoding::encode(q)))
            .await
    }

    /// GET /v1/tracks/{id}
    pub async fn get_track(&self, id: i64) -> Response {
        self.get(&format!("/v1/tracks/{}", id)).await
    }

    /// GET /v1/tracks/external/{external_id}
    pub async fn get_track_by_external_id(&self, external_id: &str) -> Response {
        self.get(&format!("/v1/tracks/external/{}", external_id))
            .await
    }

    /// POST /v1/tracks/{id}/play
    pub async fn play_track(&self, id: i64) -> Response {
        self.post(&format!("/v1/tracks/{}/play", id), None).await
    }

    /// GET /v1/tracks/{id}/lyrics
    pub async fn get_lyrics(&self, id: i64) -> Response {
        self.get(&format!("/v1/tracks/{}/lyrics", id)).await
    }

    /// PUT /v1/tracks/{id}/lyrics
    pub async fn put_lyrics(&self, id: i64, lyrics: Option<&str>) -> Response {
        self.put(
            &format!("/v1/tracks/{}/lyrics", id),
            json!({ "lyrics": lyrics }),
        )
        .await
    }

    /// POST /v1/tracks
    pub async fn create_track(&self, body: Value) -> Response {
        self.post("/v1/tracks", Some(body)).await
    }

    /// PUT /v1/tracks/{id}
    pub async fn update_track(&self, id: i64, body: Value) -> Response {
        self.put(&format!("/v1/tracks/{}", id), body).await
    }

    /// DELETE /v1/tracks/{id}
    pub async fn delete_track(&self, id: i64) -> Response {
        self.delete(&format!("/v1/tracks/{}", id)).await
    }

    // ========================================================================
    // Admin Endpoints
    // ========================================================================

    /// GET /v1/admin/jobs
    pub async fn list_jobs(&self) -> Response {
        self.get("/v1/admin/jobs").await
    }

    /// POST /v1/admin/jobs/{id}/trigger
    pub async fn trigger_job(&self, job_id: &str) -> Response {
        self.post(&format!("/v1/admin/jobs/{}/trigger", job_id), None)
            .await
    }
}
