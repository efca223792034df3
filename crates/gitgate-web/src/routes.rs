//! Web route handlers for Gitgate.
//!
//! Repository reads touch the filesystem and build a whole tree snapshot,
//! so each handler does its repository work inside `spawn_blocking` and
//! drops the handle before responding.

use askama::Template;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use gitgate_storage::{CommitInfo, FileTree, NodeId, RepoDirectory, Repository};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::WebError;
use crate::format::{clone_url, format_size, is_binary_content, pretty_date};
use crate::markdown::{language_for_extension, render_markdown, README_NAMES};
use crate::templates::*;

/// Shared state for web routes.
#[derive(Clone)]
pub struct WebState {
    /// Where repositories are found and created.
    pub repos: Arc<dyn RepoDirectory>,
    /// Application version shown in page footers.
    pub version: String,
}

/// Create the web router.
pub fn web_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    WebState: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/", get(index).post(create))
        .route("/{repo}/show", get(show))
        .route("/{repo}/raw", get(raw))
}

/// Query parameters for tree and raw views.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

/// Form posted to create a repository.
#[derive(Debug, Deserialize)]
pub struct CreateForm {
    #[serde(default)]
    pub project: String,
}

/// Scheme, host and caller of the current request, for clone URLs.
#[derive(Debug, Clone)]
struct RequestOrigin {
    scheme: String,
    host: String,
    identity: Option<String>,
}

impl RequestOrigin {
    fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            scheme: text("x-forwarded-proto").unwrap_or_else(|| "http".to_string()),
            host: text(header::HOST.as_str()).unwrap_or_else(|| "localhost".to_string()),
            identity: text(header::AUTHORIZATION.as_str())
                .and_then(|v| gitgate_auth::basic_auth_username(&v)),
        }
    }

    fn clone_url(&self, name: &str) -> String {
        clone_url(&self.scheme, &self.host, self.identity.as_deref(), name)
    }
}

fn summarize(commit: &CommitInfo) -> CommitSummary {
    let sha = commit.id.to_hex();
    CommitSummary {
        short_sha: sha[..7].to_string(),
        message: commit.summary().to_string(),
        author: commit.author.clone(),
        date: pretty_date(commit.date, Utc::now()),
    }
}

/// Repository listing.
async fn index(
    State(state): State<WebState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, WebError> {
    let origin = RequestOrigin::from_headers(&headers);
    let WebState { repos, version } = state;

    let page = tokio::task::spawn_blocking(move || -> Result<String, WebError> {
        let mut summaries = Vec::new();
        for repo in repos.list()? {
            // A repository with a corrupt head still gets listed.
            let latest = match repo.latest_commit() {
                Ok(latest) => latest.as_ref().map(summarize),
                Err(e) => {
                    tracing::warn!(repo = %repo.name, error = %e, "Cannot read latest commit");
                    None
                }
            };
            summaries.push(RepoSummary {
                clone_url: origin.clone_url(&repo.name),
                name: repo.name,
                latest,
            });
        }

        let template = IndexTemplate {
            repositories_dir: repos.root().display().to_string(),
            repos: summaries,
            version,
        };
        Ok(template.render()?)
    })
    .await??;

    Ok(Html(page))
}

/// Creates an empty repository. A blank name does nothing.
async fn create(
    State(state): State<WebState>,
    Form(form): Form<CreateForm>,
) -> Result<Redirect, WebError> {
    let project = form.project.trim().to_string();
    if !project.is_empty() {
        let repos = state.repos.clone();
        tokio::task::spawn_blocking(move || repos.create(&project)).await??;
    }
    Ok(Redirect::to("/"))
}

/// Directory listing or file view of the head commit.
async fn show(
    State(state): State<WebState>,
    Path(name): Path<String>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, WebError> {
    let origin = RequestOrigin::from_headers(&headers);
    let WebState { repos, version } = state;

    let page = tokio::task::spawn_blocking(move || {
        let repository = repos.open(&name)?;
        render_show(&repository, &query.path, &origin, version)
    })
    .await??;

    Ok(Html(page))
}

fn render_show(
    repository: &Repository,
    path: &str,
    origin: &RequestOrigin,
    version: String,
) -> Result<String, WebError> {
    let name = repository.name.clone();
    let Some(tree) = repository.head_tree()? else {
        let template = EmptyTemplate {
            clone_url: origin.clone_url(&name),
            name,
            version,
        };
        return Ok(template.render()?);
    };

    // Unknown segments fall back to the nearest existing ancestor.
    let id = tree.resolve(path);
    let node = tree.node(id);
    let breadcrumbs = build_breadcrumbs(&tree, id);

    if let Some(data) = node.data() {
        let is_binary = is_binary_content(data) || std::str::from_utf8(data).is_err();
        let content = if is_binary {
            String::new()
        } else {
            String::from_utf8_lossy(data).into_owned()
        };
        let template = BlobTemplate {
            name,
            path: node.path().to_string(),
            breadcrumbs,
            filename: node.name().to_string(),
            line_count: content.lines().count(),
            content,
            is_binary,
            language: language_for_extension(node.extension()).to_string(),
            mime: mime_guess::from_path(node.name())
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            size: format_size(data.len()),
            version,
        };
        return Ok(template.render()?);
    }

    let mut children: Vec<_> = tree.children(id).collect();
    children.sort_by_key(|(_, child)| !child.is_directory());
    let files = children
        .into_iter()
        .map(|(_, child)| FileEntry {
            name: child.name().to_string(),
            path: child.path().to_string(),
            is_dir: child.is_directory(),
            size: child.data().map(|d| format_size(d.len())).unwrap_or_default(),
        })
        .collect();

    let readme_html = README_NAMES
        .iter()
        .filter_map(|readme| tree.child(id, readme))
        .find_map(|readme| tree.node(readme).data())
        .map(|data| render_markdown(&String::from_utf8_lossy(data)));

    let template = TreeTemplate {
        clone_url: origin.clone_url(&name),
        name,
        path: node.path().to_string(),
        breadcrumbs,
        parent_path: node.parent().map(|p| tree.node(p).path().to_string()),
        files,
        latest: repository.latest_commit()?.as_ref().map(summarize),
        readme_html,
        version,
    };
    Ok(template.render()?)
}

/// Breadcrumbs from the root down to `id`, root excluded.
fn build_breadcrumbs(tree: &FileTree, id: NodeId) -> Vec<Breadcrumb> {
    let mut chain = tree.ancestors(id);
    chain.reverse();
    chain.push(id);
    chain
        .into_iter()
        .filter(|&node| node != FileTree::ROOT)
        .map(|node| {
            let node = tree.node(node);
            Breadcrumb {
                name: node.name().to_string(),
                path: node.path().to_string(),
            }
        })
        .collect()
}

/// Raw bytes of a file in the head commit.
async fn raw(
    State(state): State<WebState>,
    Path(name): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Response, WebError> {
    let repos = state.repos.clone();

    let (filename, data) = tokio::task::spawn_blocking(move || {
        let repository = repos.open(&name)?;
        let tree = repository
            .head_tree()?
            .ok_or_else(|| WebError::NotFound(format!("Repository '{}' is empty", name)))?;
        let node = tree.node(tree.resolve(&query.path));
        let data = node
            .data()
            .ok_or_else(|| WebError::NotFound(format!("'{}' is a directory", node.path())))?;
        Ok::<_, WebError>((node.name().to_string(), data.clone()))
    })
    .await??;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        filename.replace(['"', '\\'], "_")
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}
