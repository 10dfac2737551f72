//! Mapping of domain failures to HTTP responses.

use crate::catalog_store::CatalogStoreError;
use crate::server::metrics::record_error;
use crate::sync::SyncError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Sync(SyncError),
    Store(anyhow::Error),
    NotFound(String),
    BadRequest(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Sync(e) => match e {
                SyncError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                SyncError::AuthExpired(_) => (StatusCode::BAD_GATEWAY, "auth_expired"),
                SyncError::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
                SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                SyncError::TransientExternal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "external_failure")
                }
                SyncError::Store(err) => store_status(err),
            },
            ApiError::Store(err) => store_status(err),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Sync(e) => e.to_string(),
            ApiError::Store(e) => format!("{:#}", e),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::BadRequest(message) => message.clone(),
        }
    }
}

fn store_status(err: &anyhow::Error) -> (StatusCode, &'static str) {
    match err.downcast_ref::<CatalogStoreError>() {
        Some(CatalogStoreError::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
        Some(CatalogStoreError::InvalidReference { .. }) => {
            (StatusCode::BAD_REQUEST, "invalid_reference")
        }
        Some(CatalogStoreError::MissingExternalId { .. }) => {
            (StatusCode::BAD_REQUEST, "missing_external_id")
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "store_failure"),
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::Sync(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = self.message();
        if status.is_server_error() {
            error!("Request failed ({}): {}", kind, message);
            record_error(kind, "api");
        }
        (status, Json(json!({ "message": message, "error": kind }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
