//! Gitgate web pages
//!
//! Browser views over the repositories directory:
//! - Repository listing with clone URLs and latest commit
//! - Creating an empty repository from a form
//! - Tree and file views of the head commit, with README rendering
//! - Raw file download

pub mod error;
pub mod format;
pub mod markdown;
pub mod routes;
pub mod templates;

pub use error::WebError;
pub use markdown::render_markdown;
pub use routes::{web_routes, WebState};
pub use templates::*;
