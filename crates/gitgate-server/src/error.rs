//! HTTP error mapping for the smart HTTP endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gitgate_auth::AuthError;
use gitgate_git::GitError;
use gitgate_storage::StorageError;
use serde::Serialize;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("forbidden: {0}")]
    Forbidden(#[from] AuthError),
    #[error("repository not found: {0}")]
    RepoNotFound(String),
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RepoNotFound(name) | StorageError::InvalidName(name) => {
                ApiError::RepoNotFound(name)
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Storage(StorageError::Io(err))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RepoNotFound(_) | ApiError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Transport(_) | ApiError::Git(_) | ApiError::Storage(_) => {
                tracing::error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
