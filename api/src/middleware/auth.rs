//! Bearer-token guard for endpoints that expose cache internals.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Checks `Authorization: Bearer <API_SECRET_KEY>`.
///
/// Development skips the check entirely. Anywhere else a missing key is a
/// server misconfiguration, not a client error.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.is_development() {
        return Ok(next.run(req).await);
    }

    let expected = state
        .config
        .api_secret_key
        .as_deref()
        .ok_or(ApiError::Misconfigured)?;

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!(path = req.uri().path(), "Missing or malformed Authorization header");
            ApiError::Unauthorized("Missing or invalid authentication".into())
        })?;

    if token != expected {
        warn!(path = req.uri().path(), "Rejected request with wrong API token");
        return Err(ApiError::Unauthorized("Invalid authentication token".into()));
    }

    Ok(next.run(req).await)
}
