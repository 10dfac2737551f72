use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs
    pub catalog_api: Option<CatalogApiConfig>,
    pub sync: Option<SyncConfig>,
    pub refresh: Option<RefreshConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogApiConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub min_request_interval_ms: Option<u64>,
    pub max_concurrent_requests: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub artist_limit: Option<usize>,
    pub album_limit: Option<usize>,
    pub track_limit: Option<usize>,
    pub include_audio_features: Option<bool>,
    pub audio_features_batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: Option<bool>,
    pub interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
