//! Error types for the auth crate.

use thiserror::Error;

/// Reasons an access check fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The service is not one this server runs.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The service is switched off.
    #[error("service disabled: {0}")]
    ServiceDisabled(String),

    /// An RPC request arrived with the wrong content type.
    #[error("unexpected content type {actual:?}, expected {expected}")]
    ContentType {
        /// What the client sent, if anything.
        actual: Option<String>,
        /// What the service requires.
        expected: String,
    },

    /// The caller lacks the permission the service needs.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
