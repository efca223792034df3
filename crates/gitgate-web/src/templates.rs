//! Askama template definitions.

use askama::Template;
use serde::Serialize;

/// Repository row on the listing page.
#[derive(Debug, Clone, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub clone_url: String,
    /// `None` for a repository without commits.
    pub latest: Option<CommitSummary>,
}

/// Commit line shown on listings.
#[derive(Debug, Clone, Serialize)]
pub struct CommitSummary {
    pub short_sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
}

/// File entry for directory listings.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: String,
}

/// Breadcrumb navigation item.
#[derive(Debug, Clone, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// Repository listing.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub repositories_dir: String,
    pub repos: Vec<RepoSummary>,
    pub version: String,
}

/// Directory listing within a repository.
#[derive(Template)]
#[template(path = "repo/tree.html")]
pub struct TreeTemplate {
    pub name: String,
    pub clone_url: String,
    pub path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub parent_path: Option<String>,
    pub files: Vec<FileEntry>,
    pub latest: Option<CommitSummary>,
    pub readme_html: Option<String>,
    pub version: String,
}

/// Single file view.
#[derive(Template)]
#[template(path = "repo/blob.html")]
pub struct BlobTemplate {
    pub name: String,
    pub path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub filename: String,
    pub content: String,
    pub is_binary: bool,
    pub language: String,
    pub mime: String,
    pub line_count: usize,
    pub size: String,
    pub version: String,
}

/// Repository without commits.
#[derive(Template)]
#[template(path = "repo/empty.html")]
pub struct EmptyTemplate {
    pub name: String,
    pub clone_url: String,
    pub version: String,
}
