use axum::extract::FromRequest;

use crate::error::{ApiError, ApiResult};

/// `axum::Json` whose rejection is rendered like every other API error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Integer ids arrive as path segments; anything non-numeric is a client error.
pub fn parse_id(raw: &str) -> ApiResult<i32> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid ID format"))
}

/// Same as [`parse_id`] for optional filters such as `?strategyId=`.
pub fn parse_optional_id(raw: Option<&str>) -> ApiResult<Option<i32>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(raw).map(Some),
        None => Ok(None),
    }
}
