//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and its own
//! fake Spotify API.

use super::constants::*;
use super::mock_spotify::MockSpotify;
use catalog_sync_server::background_jobs::jobs::CatalogRefreshJob;
use catalog_sync_server::background_jobs::{create_scheduler, JobContext};
use catalog_sync_server::catalog_api::SpotifyClientConfig;
use catalog_sync_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use catalog_sync_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use catalog_sync_server::sync::{SyncService, SyncSettings};
use catalog_sync_server::SpotifyClient;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with an isolated database
///
/// When dropped, the server and its scheduler shut down and the temporary
/// database is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Catalog store for direct database access in tests
    pub store: Arc<dyn CatalogStore>,

    /// The fake Spotify API backing this server
    pub spotify: MockSpotify,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port with valid API credentials
    pub async fn spawn() -> Self {
        Self::spawn_with_credentials(true).await
    }

    /// Spawns a server whose catalog API client has no credentials
    pub async fn spawn_without_credentials() -> Self {
        Self::spawn_with_credentials(false).await
    }

    async fn spawn_with_credentials(with_credentials: bool) -> Self {
        let spotify = MockSpotify::spawn().await;

        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn CatalogStore> = Arc::new(
            SqliteCatalogStore::new(temp_db_dir.path().join("catalog.db"), 2)
                .expect("Failed to open catalog store"),
        );

        let client_config = SpotifyClientConfig {
            client_id: with_credentials.then(|| SPOTIFY_CLIENT_ID.to_string()),
            client_secret: with_credentials.then(|| SPOTIFY_CLIENT_SECRET.to_string()),
            api_base_url: spotify.api_base_url.clone(),
            token_url: spotify.token_url.clone(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            min_request_interval: Duration::ZERO,
        };
        let client = SpotifyClient::new(client_config).expect("Failed to build Spotify client");

        let settings = SyncSettings {
            max_concurrent_requests: 4,
            ..Default::default()
        };
        let sync_service = Arc::new(SyncService::new(store.clone(), Arc::new(client), settings));

        // Scheduler with the refresh job registered; its first run is a day
        // away so only manual triggers fire during a test
        let shutdown = CancellationToken::new();
        let job_context = JobContext::new(shutdown.child_token(), sync_service.clone());
        let (mut scheduler, scheduler_handle) = create_scheduler(shutdown.clone(), job_context);
        scheduler
            .register_job(Arc::new(CatalogRefreshJob::every_hours(24)))
            .await;
        tokio::spawn(async move { scheduler.run().await });

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: 0,
            frontend_dir_path: None,
            admin_token: Some(ADMIN_TOKEN.to_string()),
        };
        let app = make_app(ServerState::new(config, sync_service, Some(scheduler_handle)));

        // Spawn server in background task with graceful shutdown
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            spotify,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling /v1/health
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        while start.elapsed() < timeout {
            if let Ok(response) = client
                .get(format!("{}/v1/health", self.base_url))
                .send()
                .await
            {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!(
            "Server did not become ready within {}ms",
            SERVER_READY_TIMEOUT_MS
        );
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
