//! On-disk git repository storage for Gitgate.
//!
//! A repository is a directory holding a standard git layout (`HEAD`,
//! `objects/`, `refs/`). Handles are cheap to open and are meant to be
//! opened per request: nothing read from disk is cached on the handle
//! beyond the paths themselves.

mod commit;
mod directory;
mod error;
mod object;
mod refs;
mod store;
mod tree;

pub use commit::CommitInfo;
pub use directory::{FsRepoDirectory, RepoDirectory};
pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectType, TreeEntry};
pub use refs::{RefStore, Reference};
pub use store::{ObjectStore, Repository};
pub use tree::{FileTree, NodeId, TreeNode};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
