use crate::catalog_api::CatalogApiError;
use thiserror::Error;

/// Failure of a whole reconcile or refresh operation. Per-entity failures
/// never surface here; they are logged and counted as skipped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync request: {0}")]
    InvalidRequest(String),

    #[error("catalog API unavailable: {0}")]
    TransientExternal(String),

    #[error("catalog API authorization expired: {0}")]
    AuthExpired(String),

    #[error("catalog API is not configured: {0}")]
    NotConfigured(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("catalog store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<CatalogApiError> for SyncError {
    fn from(err: CatalogApiError) -> Self {
        match err {
            CatalogApiError::AuthExpired(message) => SyncError::AuthExpired(message),
            CatalogApiError::MissingCredentials => SyncError::NotConfigured(err.to_string()),
            CatalogApiError::NotFound(what) => SyncError::NotFound(what),
            CatalogApiError::Transient(_)
            | CatalogApiError::Malformed(_)
            | CatalogApiError::Rejected { .. } => SyncError::TransientExternal(err.to_string()),
        }
    }
}
