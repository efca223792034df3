//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object not found in the object store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Malformed object data or header.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Reference not found.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Malformed or unresolvable reference.
    #[error("invalid reference: {0}")]
    InvalidRef(String),

    /// Another writer holds the lock for a reference.
    #[error("reference is locked: {0}")]
    RefLocked(String),

    /// Named repository does not exist or is not a valid object store.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// Repository name is not acceptable as a directory name.
    #[error("invalid repository name: {0:?}")]
    InvalidName(String),

    /// Zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),
}
