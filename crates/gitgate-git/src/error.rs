//! Errors from framing, packs and the protocol exchanges.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("malformed pack: {0}")]
    InvalidPack(String),

    /// Bad length header on input, or a payload too long to frame on output.
    #[error("malformed pkt-line: {0}")]
    InvalidPktLine(String),

    /// The client broke the exchange (bad command, unexpected packet).
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("no such service: {0}")]
    UnknownService(String),

    #[error("missing object {0}")]
    ObjectNotFound(String),

    #[error(transparent)]
    Storage(#[from] gitgate_storage::StorageError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
