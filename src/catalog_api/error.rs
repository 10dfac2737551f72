use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogApiError {
    /// Network failure, timeout, rate limiting or a 5xx. Safe to retry later.
    #[error("catalog API temporarily unavailable: {0}")]
    Transient(String),

    /// The access token is missing, expired or was rejected.
    #[error("catalog API authorization failed: {0}")]
    AuthExpired(String),

    #[error("catalog API credentials are not configured")]
    MissingCredentials,

    #[error("catalog API resource not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("malformed catalog API response: {0}")]
    Malformed(String),

    #[error("catalog API rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl CatalogApiError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            CatalogApiError::AuthExpired(_) | CatalogApiError::MissingCredentials
        )
    }
}

impl From<reqwest::Error> for CatalogApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogApiError::Malformed(err.to_string())
        } else {
            CatalogApiError::Transient(err.to_string())
        }
    }
}
