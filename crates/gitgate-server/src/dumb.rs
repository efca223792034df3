//! Dumb HTTP fallback for clients that cannot speak the smart protocol.
//!
//! These are plain file reads. The listing files are regenerated on each
//! request so they never lag behind the refs.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use gitgate_storage::ObjectId;
use std::io;

use crate::api::{no_cache_headers, open_repo, AppState};
use crate::error::ApiError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// `info/refs` without a service: `<oid>\t<refname>` per line.
pub(crate) async fn info_refs(state: &AppState, name: String) -> Result<Response, ApiError> {
    let repo = open_repo(state, name).await?;
    let listing = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        repo.update_server_info()?;
        Ok(std::fs::read(repo.info_refs_path())?)
    })
    .await??;

    Ok((no_cache_headers(TEXT_PLAIN), listing).into_response())
}

/// `objects/info/packs`.
pub(crate) async fn info_packs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let repo = open_repo(&state, name).await?;
    let listing = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        repo.update_server_info()?;
        Ok(std::fs::read(repo.info_packs_path())?)
    })
    .await??;

    Ok((no_cache_headers(TEXT_PLAIN), listing).into_response())
}

/// The repository's `HEAD` file.
pub(crate) async fn head(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let repo = open_repo(&state, name).await?;
    let content = tokio::fs::read(repo.git_dir.join("HEAD")).await?;
    Ok((no_cache_headers(TEXT_PLAIN), content).into_response())
}

/// A loose object file, still zlib-compressed.
pub(crate) async fn loose_object(
    State(state): State<AppState>,
    Path((name, prefix, suffix)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    if prefix.len() != 2 || suffix.len() != 38 {
        return Err(ApiError::BadRequest(format!(
            "not an object path: {}/{}",
            prefix, suffix
        )));
    }
    let id = ObjectId::from_hex(&format!("{}{}", prefix, suffix))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let repo = open_repo(&state, name).await?;
    let content = match tokio::fs::read(repo.objects.object_path(&id)).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::ObjectNotFound(id.to_hex()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-git-loose-object"),
        )],
        content,
    )
        .into_response())
}
