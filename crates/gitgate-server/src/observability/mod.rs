//! Logging setup and per-request tracing.
//!
//! ```rust,ignore
//! use gitgate_server::{config::LogFormat, observability::{init_logging, tag_request}};
//!
//! init_logging("info", LogFormat::Pretty);
//! let app = axum::Router::<()>::new().layer(axum::middleware::from_fn(tag_request));
//! ```

mod logging;
pub mod middleware;

pub use logging::init_logging;
pub use middleware::{tag_request, RequestId, REQUEST_ID_HEADER};
