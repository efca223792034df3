//! Git wire protocol for Gitgate.
//!
//! This crate covers the bytes that cross the wire in git's smart HTTP
//! transport: pkt-line framing, pack files, and the `upload-pack` and
//! `receive-pack` exchanges. The exchanges are reached through the
//! [`ObjectEngine`] trait so the HTTP layer never depends on how objects are
//! stored.

mod engine;
mod error;
mod pack;
mod pktline;
mod protocol;
mod service;

pub use engine::{LooseObjectEngine, ObjectEngine};
pub use error::GitError;
pub use pack::{PackBuilder, PackParser};
pub use pktline::{PktLine, PktLineReader, PktLineWriter, MAX_PAYLOAD_LEN, MAX_PKT_LEN};
pub use protocol::{
    advertise_refs, receive_pack, upload_pack, Command, CommandStatus, RefAdvertisement,
    UploadRequest,
};
pub use service::Service;

/// Result type for git protocol operations.
pub type Result<T> = std::result::Result<T, GitError>;
