//! Access control for Gitgate.
//!
//! The dispatcher asks an [`AccessGate`] about every smart HTTP request
//! before it reads the body or opens the repository. The answer is binary;
//! read-only access is expressed by allowing `upload-pack` and denying
//! `receive-pack` for the same caller.
//!
//! # Example
//!
//! ```
//! use gitgate_auth::{AccessGate, AccessRequest, Permission, ServicePolicy};
//!
//! let policy = ServicePolicy::new()
//!     .with_default_permission(Permission::Read)
//!     .grant("alice", Permission::Write);
//!
//! let push = AccessRequest::new("receive-pack", "project");
//! assert!(!policy.is_authorized(&push));
//! assert!(policy.is_authorized(&push.with_identity(Some("alice"))));
//! ```

mod error;
mod gate;
mod identity;
mod permission;

pub use error::{AuthError, Result};
pub use gate::{AccessConfig, AccessGate, AccessRequest, ServicePolicy};
pub use identity::basic_auth_username;
pub use permission::Permission;
