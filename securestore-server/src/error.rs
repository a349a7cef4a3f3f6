use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use securestore_access::AccessError;
use securestore_storage::StorageError;
use serde_json::json;
use thiserror::Error;

/// Message of every collapsed download failure in hardened mode
pub const ACCESS_FORBIDDEN: &str = "access forbidden";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn access_forbidden() -> Self {
        ServerError::Forbidden(ACCESS_FORBIDDEN.into())
    }
}

impl From<AccessError> for ServerError {
    fn from(e: AccessError) -> Self {
        if e.is_not_found() {
            ServerError::NotFound(e.to_string())
        } else if e.is_conflict() {
            ServerError::Conflict(e.to_string())
        } else if e.is_validation() {
            ServerError::BadRequest(e.to_string())
        } else {
            ServerError::Internal(e.to_string())
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        match e {
            e if e.is_not_found() => ServerError::NotFound(e.to_string()),
            e if e.is_conflict() => ServerError::Conflict(e.to_string()),
            StorageError::InvalidPath(_) => ServerError::BadRequest(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ServerError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone())
            }
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
