//! Bearer-token authentication.
//!
//! Edge agents present `Authorization: Bearer <token>`; the token must be a
//! row in `api_tokens`. There is no signing or expiry: revoking a token is
//! deleting its row.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

use outpost_db::{DbResult, TokenRepository};

use crate::error::ApiError;
use crate::state::AppState;

/// Label of the token created on first start.
pub const BOOTSTRAP_LABEL: &str = "bootstrap";

/// Extracts the token from an `Authorization: Bearer ...` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Rejects requests that do not carry a known token.
pub async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer_token(request.headers()) else {
        debug!(path = %request.uri().path(), "Request without bearer token");
        return Err(ApiError::Unauthorized);
    };

    if !state.db.tokens().verify(token).await? {
        debug!(path = %request.uri().path(), "Request with unknown token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Issues a first token when none exist. Returns it so it can be shown once.
pub async fn bootstrap_token(tokens: &TokenRepository) -> DbResult<Option<String>> {
    if tokens.count().await? > 0 {
        return Ok(None);
    }
    let token = tokens.issue(BOOTSTRAP_LABEL).await?;
    info!(label = BOOTSTRAP_LABEL, "No API tokens found, issued a bootstrap token");
    Ok(Some(token))
}
