use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sea_orm::{DbErr, SqlErr};
use serde_json::{json, Value};
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors a handler can return. Each maps to a status code and a JSON body
/// `{"error": ..., "details": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<Value>,
    },
    #[error("{message}: {cause:#}")]
    Internal {
        message: String,
        cause: anyhow::Error,
    },
    #[error("Server configuration error")]
    Misconfigured,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request_with(message: impl Into<String>, details: impl Into<Value>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>, details: impl Into<Value>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn internal(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            message: message.into(),
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } | ApiError::Misconfigured => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(source: anyhow::Error) -> Self {
        ApiError::internal("Internal server error", source)
    }
}

impl From<DbErr> for ApiError {
    fn from(source: DbErr) -> Self {
        ApiError::internal("Database error", source)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request_with("Invalid request body", rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::bad_request_with("Invalid multipart form", e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest { message, details } | ApiError::Conflict { message, details } => {
                match details {
                    Some(details) => json!({ "error": message, "details": details }),
                    None => json!({ "error": message }),
                }
            }
            ApiError::Unauthorized(message) | ApiError::NotFound(message) => {
                json!({ "error": message })
            }
            ApiError::Internal { message, cause } => {
                error!(error = %format!("{:#}", cause), "{}", message);
                json!({ "error": message, "details": cause.to_string() })
            }
            ApiError::Misconfigured => {
                error!("API_SECRET_KEY is not set; refusing protected request");
                json!({ "error": "Server configuration error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Attaches a user-facing message to unexpected failures.
pub trait OrInternal<T> {
    fn or_internal(self, message: &str) -> ApiResult<T>;
}

impl<T, E> OrInternal<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_internal(self, message: &str) -> ApiResult<T> {
        self.map_err(|e| ApiError::internal(message, e))
    }
}

/// True when the error chain holds a unique-constraint violation from the database.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DbErr>()
            .and_then(DbErr::sql_err)
            .map(|sql| matches!(sql, SqlErr::UniqueConstraintViolation(_)))
            .unwrap_or(false)
    })
}
