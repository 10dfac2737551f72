mod file_config;

pub use file_config::{CatalogApiConfig, FileConfig, RefreshConfig, SyncConfig};

use crate::catalog_api::{SpotifyClientConfig, MAX_AUDIO_FEATURES_IDS, SPOTIFY_API_BASE, SPOTIFY_TOKEN_URL};
use crate::server::RequestsLoggingLevel;
use crate::sync::{SyncOptions, SyncSettings, MAX_SYNC_LIMIT};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs (with defaults)
    pub catalog_api: CatalogApiSettings,
    pub sync: SyncSettings,
    pub refresh: RefreshSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogApiSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
    pub request_timeout_sec: u64,
    pub min_request_interval_ms: u64,
}

impl Default for CatalogApiSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base_url: SPOTIFY_API_BASE.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            request_timeout_sec: 30,
            min_request_interval_ms: 0,
        }
    }
}

impl CatalogApiSettings {
    pub fn client_config(&self) -> SpotifyClientConfig {
        SpotifyClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            api_base_url: self.api_base_url.clone(),
            token_url: self.token_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_sec),
            min_request_interval: Duration::from_millis(self.min_request_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    pub enabled: bool,
    pub interval_hours: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
        }
    }
}

/// Treat empty strings as unset; secrets often come from blank env vars.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_limit(name: &str, value: usize) -> Result<usize> {
    if value == 0 || value > MAX_SYNC_LIMIT {
        bail!("sync.{} must be between 1 and {}, got {}", name, MAX_SYNC_LIMIT, value);
    }
    Ok(value)
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());
        let admin_token = non_empty(file.admin_token).or_else(|| non_empty(cli.admin_token.clone()));

        let api_file = file.catalog_api.unwrap_or_default();
        let api_defaults = CatalogApiSettings::default();
        let catalog_api = CatalogApiSettings {
            client_id: non_empty(api_file.client_id)
                .or_else(|| non_empty(cli.spotify_client_id.clone())),
            client_secret: non_empty(api_file.client_secret)
                .or_else(|| non_empty(cli.spotify_client_secret.clone())),
            api_base_url: api_file.api_base_url.unwrap_or(api_defaults.api_base_url),
            token_url: api_file.token_url.unwrap_or(api_defaults.token_url),
            request_timeout_sec: api_file
                .request_timeout_sec
                .unwrap_or(api_defaults.request_timeout_sec),
            min_request_interval_ms: api_file
                .min_request_interval_ms
                .unwrap_or(api_defaults.min_request_interval_ms),
        };

        let sync_file = file.sync.unwrap_or_default();
        let option_defaults = SyncOptions::default();
        let default_options = SyncOptions {
            artist_limit: check_limit(
                "artist_limit",
                sync_file.artist_limit.unwrap_or(option_defaults.artist_limit),
            )?,
            album_limit: check_limit(
                "album_limit",
                sync_file.album_limit.unwrap_or(option_defaults.album_limit),
            )?,
            track_limit: check_limit(
                "track_limit",
                sync_file.track_limit.unwrap_or(option_defaults.track_limit),
            )?,
            include_audio_features: sync_file
                .include_audio_features
                .unwrap_or(option_defaults.include_audio_features),
        };
        let audio_features_batch_size = sync_file
            .audio_features_batch_size
            .unwrap_or(MAX_AUDIO_FEATURES_IDS);
        if audio_features_batch_size == 0 || audio_features_batch_size > MAX_AUDIO_FEATURES_IDS {
            bail!(
                "sync.audio_features_batch_size must be between 1 and {}",
                MAX_AUDIO_FEATURES_IDS
            );
        }
        let sync = SyncSettings {
            max_concurrent_requests: api_file.max_concurrent_requests.unwrap_or(1).max(1),
            audio_features_batch_size,
            default_options,
        };

        let refresh_file = file.refresh.unwrap_or_default();
        let refresh_defaults = RefreshSettings::default();
        let refresh = RefreshSettings {
            enabled: refresh_file.enabled.unwrap_or(refresh_defaults.enabled),
            interval_hours: refresh_file
                .interval_hours
                .unwrap_or(refresh_defaults.interval_hours),
        };
        if refresh.interval_hours == 0 {
            bail!("refresh.interval_hours must be at least 1");
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            admin_token,
            catalog_api,
            sync,
            refresh,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
