//! # Gitgate Server
//!
//! Serves a directory of git repositories over HTTP.
//!
//! - Smart HTTP: `info/refs?service=`, `git-upload-pack` and
//!   `git-receive-pack`, each behind an [`AccessGate`](gitgate_auth::AccessGate)
//! - Dumb HTTP: `info/refs`, `HEAD`, `objects/info/packs` and loose objects
//! - Browsing pages from `gitgate-web`
//! - `/health`
//!
//! ```rust,no_run
//! use gitgate_auth::ServicePolicy;
//! use gitgate_server::{create_router, AppState};
//! use gitgate_storage::FsRepoDirectory;
//! use std::sync::Arc;
//!
//! # async fn run() -> std::io::Result<()> {
//! let state = AppState::new(
//!     Arc::new(FsRepoDirectory::new("/srv/git")),
//!     Arc::new(ServicePolicy::new()),
//!     env!("CARGO_PKG_VERSION"),
//! );
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, create_router(state)).await
//! # }
//! ```

pub mod api;
pub mod config;
mod dumb;
pub mod error;
pub mod observability;
pub mod rpc;

pub use api::{create_router, AppState};
pub use config::{LogFormat, ServerConfig};
pub use error::ApiError;
