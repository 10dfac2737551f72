//! Spotify Web API client.
//!
//! Authenticates with the client-credentials flow. The token is acquired by
//! `ensure_token` at the start of an operation and reused for every request
//! of that operation; expiry in the middle of an operation surfaces as
//! `CatalogApiError::AuthExpired` instead of being retried.

use super::error::CatalogApiError;
use super::models::*;
use super::CatalogApi;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Largest page the API serves for search, artist albums and album tracks.
const MAX_PAGE_SIZE: usize = 50;
/// Largest id batch accepted by the audio features endpoint.
pub const MAX_AUDIO_FEATURES_IDS: usize = 100;
/// Tokens this close to expiry are treated as expired.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const ALBUM_GROUPS: &str = "album,single,compilation";

#[derive(Debug, Clone)]
pub struct SpotifyClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
    pub request_timeout: Duration,
    /// Minimum spacing between two requests. Zero disables throttling.
    pub min_request_interval: Duration,
}

impl Default for SpotifyClientConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: SPOTIFY_API_BASE.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            min_request_interval: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

pub struct SpotifyClient {
    http: Client,
    config: SpotifyClientConfig,
    token: RwLock<Option<AccessToken>>,
    last_request: Mutex<Instant>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyClientConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            last_request: Mutex::new(Instant::now() - config.min_request_interval),
            config,
            token: RwLock::new(None),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.config.client_id.is_some() && self.config.client_secret.is_some()
    }

    async fn rate_limit(&self) {
        if self.config.min_request_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.config.min_request_interval {
            tokio::time::sleep(self.config.min_request_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn authenticate(&self) -> Result<AccessToken, CatalogApiError> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(CatalogApiError::MissingCredentials);
        };
        let basic = general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret));

        let response = self
            .http
            .post(&self.config.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogApiError::AuthExpired(format!(
                "token request rejected with status {}: {}",
                status, body
            )));
        }
        let body: RawTokenResponse = Self::decode(response, "token").await?;
        let expires_in = Duration::from_secs(body.expires_in.unwrap_or(3600));
        crate::server::metrics::record_token_refresh();
        info!(
            "Acquired catalog API access token valid for {}s",
            expires_in.as_secs()
        );
        Ok(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + expires_in,
        })
    }

    async fn bearer(&self) -> Result<String, CatalogApiError> {
        let token = self.token.read().await;
        match token.as_ref() {
            Some(token) => Ok(format!("Bearer {}", token.value)),
            None => Err(CatalogApiError::AuthExpired(
                "no access token, authenticate first".to_string(),
            )),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, CatalogApiError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return serde_json::from_str(&text)
                .map_err(|e| CatalogApiError::Malformed(format!("{}: {}", what, e)));
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => CatalogApiError::AuthExpired(format!("{}: {}", what, body)),
            StatusCode::NOT_FOUND => CatalogApiError::NotFound(what.to_string()),
            StatusCode::TOO_MANY_REQUESTS => CatalogApiError::Transient(format!(
                "{}: rate limited, retry after {}s",
                what,
                retry_after.as_deref().unwrap_or("?")
            )),
            s if s.is_server_error() => {
                CatalogApiError::Transient(format!("{}: status {}", what, s))
            }
            s => CatalogApiError::Rejected {
                status: s.as_u16(),
                message: body,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogApiError> {
        let bearer = self.bearer().await?;
        self.rate_limit().await;
        let url = format!("{}{}", self.config.api_base_url, path);
        debug!("GET {} {:?}", url, query);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .query(query)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    /// Follow offset pagination until `limit` items are collected or the
    /// listing is exhausted.
    async fn get_paged<T, F>(
        &self,
        path: &str,
        extra: &[(&str, String)],
        limit: usize,
        unwrap: F,
    ) -> Result<Vec<T>, CatalogApiError>
    where
        T: DeserializeOwned + Default,
        F: Fn(serde_json::Value) -> Result<RawPage, serde_json::Error>,
    {
        let mut items = Vec::new();
        while items.len() < limit {
            let page_size = (limit - items.len()).min(MAX_PAGE_SIZE);
            let mut query: Vec<(&str, String)> = extra.to_vec();
            query.push(("limit", page_size.to_string()));
            query.push(("offset", items.len().to_string()));

            let value: serde_json::Value = self.get_json(path, &query).await?;
            let page = unwrap(value).map_err(|e| CatalogApiError::Malformed(format!("{}: {}", path, e)))?;
            let received = page.items.len();
            let has_next = page.next.is_some();
            items.extend(page.into_items::<T>(path));
            if !has_next || received == 0 {
                break;
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn ensure_token(&self) -> Result<(), CatalogApiError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(());
            }
        }
        let mut slot = self.token.write().await;
        // another caller may have refreshed while we waited for the lock
        if slot.as_ref().is_some_and(AccessToken::is_fresh) {
            return Ok(());
        }
        *slot = Some(self.authenticate().await?);
        Ok(())
    }

    async fn search_artists(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawArtist>, CatalogApiError> {
        self.get_paged(
            "/search",
            &[("q", query.to_string()), ("type", "artist".to_string())],
            limit,
            |value| {
                let response: RawSearchResponse = serde_json::from_value(value)?;
                Ok(response.artists.unwrap_or_default())
            },
        )
        .await
    }

    async fn artist_albums(
        &self,
        artist_id: &str,
        limit: usize,
    ) -> Result<Vec<RawAlbum>, CatalogApiError> {
        self.get_paged(
            &format!("/artists/{}/albums", encode_id(artist_id)),
            &[("include_groups", ALBUM_GROUPS.to_string())],
            limit,
            serde_json::from_value,
        )
        .await
    }

    async fn album_tracks(
        &self,
        album_id: &str,
        limit: usize,
    ) -> Result<Vec<RawTrack>, CatalogApiError> {
        self.get_paged(
            &format!("/albums/{}/tracks", encode_id(album_id)),
            &[],
            limit,
            serde_json::from_value,
        )
        .await
    }

    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogApiError> {
        self.get_json(&format!("/artists/{}", encode_id(id)), &[])
            .await
    }

    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogApiError> {
        self.get_json(&format!("/albums/{}", encode_id(id)), &[])
            .await
    }

    async fn track(&self, id: &str) -> Result<RawTrack, CatalogApiError> {
        self.get_json(&format!("/tracks/{}", encode_id(id)), &[])
            .await
    }

    async fn audio_features(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<RawAudioFeatures>>, CatalogApiError> {
        let mut features = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_AUDIO_FEATURES_IDS) {
            let response: RawAudioFeaturesResponse = self
                .get_json("/audio-features", &[("ids", chunk.join(","))])
                .await?;
            features.extend(response.into_slots());
        }
        Ok(features)
    }
}
