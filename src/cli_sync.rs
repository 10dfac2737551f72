//! Catalog Sync Tool
//!
//! Runs a sync, a refresh or prints the sync status directly against the
//! catalog database, without going through the HTTP server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalog_sync_server::catalog_store::SqliteCatalogStore;
use catalog_sync_server::config::{AppConfig, CliConfig, FileConfig};
use catalog_sync_server::sync::SyncOptionsOverride;
use catalog_sync_server::{SpotifyClient, SyncService};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(about = "Sync the local catalog with the Spotify catalog")]
struct CliArgs {
    /// Directory holding the catalog database.
    #[clap(long, value_parser = parse_path)]
    db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long, value_parser = parse_path)]
    config: Option<PathBuf>,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    spotify_client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    spotify_client_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search artists matching the query and import their albums and tracks.
    Sync {
        query: String,

        #[clap(long)]
        artist_limit: Option<usize>,

        #[clap(long)]
        album_limit: Option<usize>,

        #[clap(long)]
        track_limit: Option<usize>,

        /// Skip the audio features backfill.
        #[clap(long, default_value_t = false)]
        no_audio_features: bool,
    },

    /// Refresh popularity and follower counts of every synced record.
    Refresh,

    /// Print counts of synced records and the time of the last sync.
    Status,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    let cli_config = CliConfig {
        db_dir: args.db_dir.clone(),
        spotify_client_id: args.spotify_client_id.clone(),
        spotify_client_secret: args.spotify_client_secret.clone(),
        ..Default::default()
    };
    let file_config = match &args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let db_path = config.catalog_db_path();
    info!("Catalog database: {}", db_path.display());
    let store = Arc::new(SqliteCatalogStore::new(&db_path, 1)?);
    let client = SpotifyClient::new(config.catalog_api.client_config())?;
    let service = SyncService::new(store, Arc::new(client), config.sync.clone());

    match args.command {
        Command::Sync {
            query,
            artist_limit,
            album_limit,
            track_limit,
            no_audio_features,
        } => {
            let overrides = SyncOptionsOverride {
                artist_limit,
                album_limit,
                track_limit,
                include_audio_features: if no_audio_features { Some(false) } else { None },
            };
            let options = overrides.apply(service.default_options());
            let summary = service.reconcile(&query, &options).await?;
            print_json(&summary)?;
        }
        Command::Refresh => {
            let summary = service.refresh().await?;
            print_json(&summary)?;
        }
        Command::Status => {
            print_json(&service.status()?)?;
        }
    }

    Ok(())
}
