//! Error types for the web pages.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Web page errors.
#[derive(Debug, Error)]
pub enum WebError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request cannot be served as sent.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            WebError::Template(msg) | WebError::Internal(msg) => {
                tracing::error!(error = %msg, "Page failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Error - Gitgate</title>
</head>
<body style="font-family: sans-serif; text-align: center; margin-top: 4em">
    <h1>{}</h1>
    <p>{}</p>
    <a href="/">Back to repositories</a>
</body>
</html>"#,
            status.as_u16(),
            escape_html(&message)
        );

        (status, Html(html)).into_response()
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl From<askama::Error> for WebError {
    fn from(err: askama::Error) -> Self {
        WebError::Template(err.to_string())
    }
}

impl From<tokio::task::JoinError> for WebError {
    fn from(err: tokio::task::JoinError) -> Self {
        WebError::Internal(err.to_string())
    }
}

impl From<gitgate_storage::StorageError> for WebError {
    fn from(err: gitgate_storage::StorageError) -> Self {
        match err {
            gitgate_storage::StorageError::RepoNotFound(name) => {
                WebError::NotFound(format!("Repository '{}' not found", name))
            }
            gitgate_storage::StorageError::InvalidName(name) => {
                WebError::BadRequest(format!("'{}' is not a valid repository name", name))
            }
            other => WebError::Internal(other.to_string()),
        }
    }
}
