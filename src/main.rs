use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_sync_server::background_jobs::jobs::CatalogRefreshJob;
use catalog_sync_server::background_jobs::{create_scheduler, JobContext};
use catalog_sync_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use catalog_sync_server::config::{AppConfig, CliConfig, FileConfig};
use catalog_sync_server::server::{metrics, run_server, ServerConfig, ServerState};
use catalog_sync_server::{RequestsLoggingLevel, SpotifyClient, SyncService};

const READ_POOL_SIZE: usize = 4;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the catalog database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3002)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9092)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Bearer token required on mutating routes.
    #[clap(long, env = "CATALOG_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            frontend_dir_path: self.frontend_dir_path.clone(),
            admin_token: self.admin_token.clone(),
            spotify_client_id: self.spotify_client_id.clone(),
            spotify_client_secret: self.spotify_client_secret.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let db_path = config.catalog_db_path();
    info!("Opening SQLite catalog database at {:?}...", db_path);
    let catalog_store = Arc::new(SqliteCatalogStore::new(&db_path, READ_POOL_SIZE)?);
    metrics::record_catalog_counts(&catalog_store.count_all()?);

    let spotify_client = SpotifyClient::new(config.catalog_api.client_config())?;
    if !spotify_client.has_credentials() {
        warn!("No catalog API credentials configured, sync and refresh will fail until they are set");
    }

    let sync_service = Arc::new(SyncService::new(
        catalog_store,
        Arc::new(spotify_client),
        config.sync.clone(),
    ));

    let shutdown_token = CancellationToken::new();

    let scheduler_handle = if config.refresh.enabled {
        let job_context = JobContext::new(shutdown_token.child_token(), sync_service.clone());
        let (mut scheduler, handle) = create_scheduler(shutdown_token.clone(), job_context);
        scheduler
            .register_job(Arc::new(CatalogRefreshJob::every_hours(
                config.refresh.interval_hours,
            )))
            .await;
        info!(
            "Catalog refresh scheduled every {}h",
            config.refresh.interval_hours
        );
        tokio::spawn(async move { scheduler.run().await });
        Some(handle)
    } else {
        info!("Scheduled catalog refresh disabled");
        None
    };

    let ctrl_c_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        ctrl_c_token.cancel();
    });

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        metrics_port: config.metrics_port,
        frontend_dir_path: config.frontend_dir_path.clone(),
        admin_token: config.admin_token.clone(),
    };
    if server_config.admin_token.is_none() {
        warn!("No admin token configured, mutating routes are disabled");
    }

    let state = ServerState::new(server_config, sync_service, scheduler_handle);
    run_server(state, shutdown_token).await
}
