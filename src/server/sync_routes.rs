//! Sync API routes

use super::auth::AdminAuth;
use super::error::ApiResult;
use super::state::{GuardedSyncService, ServerState};
use crate::sync::{RefreshSummary, SyncOptionsOverride, SyncStatus, SyncSummary};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, Debug)]
struct SyncBody {
    query: String,
    #[serde(default)]
    options: SyncOptionsOverride,
}

/// POST /sync/sync - Walk the external catalog from the artists matching the query
async fn sync(
    _auth: AdminAuth,
    State(sync_service): State<GuardedSyncService>,
    Json(body): Json<SyncBody>,
) -> ApiResult<Json<SyncSummary>> {
    let options = body.options.apply(sync_service.default_options());
    info!("Sync requested for {:?} with {:?}", body.query, options);
    let summary = sync_service.reconcile(&body.query, &options).await?;
    Ok(Json(summary))
}

/// POST /sync/refresh - Overwrite popularity and follower counts of synced records
async fn refresh(
    _auth: AdminAuth,
    State(sync_service): State<GuardedSyncService>,
) -> ApiResult<Json<RefreshSummary>> {
    let summary = sync_service.refresh().await?;
    Ok(Json(summary))
}

/// GET /sync/status
async fn status(State(sync_service): State<GuardedSyncService>) -> ApiResult<Json<SyncStatus>> {
    Ok(Json(sync_service.status()?))
}

pub fn make_sync_routes(state: ServerState) -> Router {
    Router::new()
        .route("/sync", post(sync))
        .route("/refresh", post(refresh))
        .route("/status", get(status))
        .with_state(state)
}
