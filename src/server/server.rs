use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::auth::AdminAuth;
use super::catalog_routes::make_catalog_routes;
use super::error::{ApiError, ApiResult};
use super::metrics::metrics_handler;
use super::state::{OptionalSchedulerHandle, ServerState};
use super::sync_routes::make_sync_routes;
use super::{log_requests, ServerConfig};
use crate::background_jobs::{JobError, JobInfo};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

// =============================================================================
// Admin endpoints for background jobs
// =============================================================================

/// GET /admin/jobs - List background jobs with their last run
async fn list_jobs(
    _auth: AdminAuth,
    State(scheduler): State<OptionalSchedulerHandle>,
) -> Json<Vec<JobInfo>> {
    match scheduler {
        Some(handle) => Json(handle.list_jobs().await),
        None => Json(Vec::new()),
    }
}

/// POST /admin/jobs/{id}/trigger - Run a job now
async fn trigger_job(
    _auth: AdminAuth,
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let Some(handle) = scheduler else {
        return Err(ApiError::NotFound(format!("job {}", job_id)));
    };
    match handle.trigger_job(&job_id).await {
        Ok(()) => {
            info!("Job {} triggered from the admin API", job_id);
            Ok(StatusCode::ACCEPTED)
        }
        Err(JobError::NotFound) => Err(ApiError::NotFound(format!("job {}", job_id))),
        Err(JobError::AlreadyRunning) => Ok(StatusCode::CONFLICT),
        Err(e) => Err(ApiError::Store(anyhow::anyhow!(e))),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let admin_routes: Router = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}/trigger", post(trigger_job))
        .with_state(state.clone());

    let mut app: Router = Router::new()
        .route("/v1/health", get(health))
        .with_state(state.clone())
        .nest("/v1", make_catalog_routes(state.clone()))
        .nest("/v1/sync", make_sync_routes(state.clone()))
        .nest("/v1/admin", admin_routes);

    if let Some(frontend_path) = &state.config.frontend_dir_path {
        let static_files_service =
            ServeDir::new(frontend_path).append_index_html_on_directories(true);
        app = app.fallback_service(static_files_service);
    }

    // Per route so the metrics see the route template instead of the raw path
    app.route_layer(middleware::from_fn_with_state(state, log_requests))
        .layer(CorsLayer::permissive())
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the API and the metrics endpoint until `shutdown` is cancelled.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let config: ServerConfig = state.config.clone();
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?;

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);

    let metrics_shutdown = shutdown.clone();
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await
        {
            warn!("Metrics server stopped with error: {}", e);
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server failed")?;

    let _ = metrics_server.await;
    info!("Server stopped");
    Ok(())
}
