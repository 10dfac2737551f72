use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

pub const HEADER_AUTHORIZATION_KEY: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Proof that the request carried the configured admin token.
#[derive(Debug)]
pub struct AdminAuth;

pub enum AdminAuthExtractionError {
    AccessDenied,
}

impl IntoResponse for AdminAuthExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminAuthExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_AUTHORIZATION_KEY)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(|t| t.trim().to_string())
}

/// Constant time comparison, the token length is not secret.
fn tokens_match(expected: &str, given: &str) -> bool {
    if expected.len() != given.len() {
        return false;
    }
    expected
        .bytes()
        .zip(given.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn authorize(parts: &Parts, ctx: &ServerState) -> Option<AdminAuth> {
    let Some(expected) = ctx.config.admin_token.as_deref() else {
        debug!("No admin token configured, rejecting mutating request.");
        return None;
    };
    let Some(given) = extract_bearer_token(parts) else {
        debug!("No bearer token in headers.");
        return None;
    };
    if tokens_match(expected, &given) {
        Some(AdminAuth)
    } else {
        debug!("Bearer token does not match.");
        None
    }
}

impl FromRequestParts<ServerState> for AdminAuth {
    type Rejection = AdminAuthExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, ctx).ok_or(AdminAuthExtractionError::AccessDenied)
    }
}
