//! HTTP API for Gitgate.
//!
//! Implements the git smart HTTP endpoints and mounts the browsing pages.
//!
//! Every smart HTTP request is checked by the access gate before anything
//! else happens: a refused request never opens a repository and never reads
//! its body. Past the gate, the response carries its git content type and
//! the no-cache headers whatever the outcome.

use axum::{
    body::Body,
    extract::{FromRef, Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gitgate_auth::{basic_auth_username, AccessGate, AccessRequest, AuthError};
use gitgate_git::{LooseObjectEngine, ObjectEngine, Service};
use gitgate_storage::{RepoDirectory, Repository};
use gitgate_web::{web_routes, WebState};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dumb;
use crate::error::ApiError;
use crate::observability::tag_request;
use crate::rpc::{advertisement, serve_rpc, BodyEncoding};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Where repositories are found and created.
    pub repos: Arc<dyn RepoDirectory>,
    /// Runs upload-pack and receive-pack.
    pub engine: Arc<dyn ObjectEngine>,
    /// Decides who may fetch and push.
    pub gate: Arc<dyn AccessGate>,
    /// Application version, computed once at startup.
    pub version: String,
}

impl AppState {
    /// Creates state backed by the built-in engine.
    pub fn new(
        repos: Arc<dyn RepoDirectory>,
        gate: Arc<dyn AccessGate>,
        version: impl Into<String>,
    ) -> Self {
        let version = version.into();
        Self {
            repos,
            engine: Arc::new(LooseObjectEngine::new(&version)),
            gate,
            version,
        }
    }

    /// Replaces the object engine.
    pub fn with_engine(mut self, engine: Arc<dyn ObjectEngine>) -> Self {
        self.engine = engine;
        self
    }
}

impl FromRef<AppState> for WebState {
    fn from_ref(state: &AppState) -> Self {
        WebState {
            repos: state.repos.clone(),
            version: state.version.clone(),
        }
    }
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Git smart HTTP protocol
        .route("/{repo}/info/refs", get(info_refs))
        .route("/{repo}/git-upload-pack", post(git_upload_pack))
        .route("/{repo}/git-receive-pack", post(git_receive_pack))
        // Dumb HTTP protocol
        .route("/{repo}/HEAD", get(dumb::head))
        .route("/{repo}/objects/info/packs", get(dumb::info_packs))
        .route("/{repo}/objects/{prefix}/{suffix}", get(dumb::loose_object))
        .merge(web_routes())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(tag_request))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}

/// Headers that keep intermediaries from caching a response.
pub(crate) fn no_cache_headers(content_type: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(
        header::EXPIRES,
        HeaderValue::from_static("Fri, 01 Jan 1980 00:00:00 GMT"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, max-age=0, must-revalidate"),
    );
    headers
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller identity from HTTP Basic credentials.
fn identity(headers: &HeaderMap) -> Option<String> {
    header_str(headers, &header::AUTHORIZATION).and_then(basic_auth_username)
}

/// Runs the gate and resolves the service it let through.
fn authorize(gate: &dyn AccessGate, request: &AccessRequest<'_>) -> Result<Service, ApiError> {
    if let Err(e) = gate.check(request) {
        tracing::warn!(
            repo = request.repository,
            service = request.service,
            identity = request.identity.unwrap_or("-"),
            reason = %e,
            "Access denied"
        );
        return Err(e.into());
    }
    request
        .service
        .parse()
        .map_err(|_| ApiError::Forbidden(AuthError::UnknownService(request.service.to_string())))
}

pub(crate) async fn open_repo(state: &AppState, name: String) -> Result<Repository, ApiError> {
    let repos = state.repos.clone();
    Ok(tokio::task::spawn_blocking(move || repos.open(&name)).await??)
}

/// Query of `info/refs`.
#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    pub service: Option<String>,
}

/// Git info/refs endpoint: smart advertisement with `?service=`, the dumb
/// listing without.
async fn info_refs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<InfoRefsQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(service_name) = query.service else {
        return dumb::info_refs(&state, name).await.into_response();
    };

    let identity = identity(&headers);
    let request = AccessRequest::new(&service_name, &name).with_identity(identity.as_deref());
    let service = match authorize(state.gate.as_ref(), &request) {
        Ok(service) => service,
        Err(e) => return e.into_response(),
    };

    let framing = no_cache_headers(&service.advertisement_content_type());
    let result = async {
        let repo = open_repo(&state, name).await?;
        let engine = state.engine.clone();
        let body =
            tokio::task::spawn_blocking(move || advertisement(engine.as_ref(), &repo, service))
                .await??;
        Ok::<_, ApiError>(body)
    }
    .await;

    match result {
        Ok(body) => (framing, body).into_response(),
        Err(e) => (framing, e).into_response(),
    }
}

/// Git upload-pack endpoint - handles fetch/clone.
async fn git_upload_pack(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    dispatch_rpc(state, Service::UploadPack, name, headers, body).await
}

/// Git receive-pack endpoint - handles push.
async fn git_receive_pack(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    dispatch_rpc(state, Service::ReceivePack, name, headers, body).await
}

async fn dispatch_rpc(
    state: AppState,
    service: Service,
    name: String,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let identity = identity(&headers);
    let request = AccessRequest::new(service.as_str(), &name)
        .with_identity(identity.as_deref())
        .with_content_type_check(header_str(&headers, &header::CONTENT_TYPE));
    if let Err(e) = authorize(state.gate.as_ref(), &request) {
        return e.into_response();
    }

    let framing = no_cache_headers(&service.result_content_type());
    let encoding = BodyEncoding::from_header(header_str(&headers, &header::CONTENT_ENCODING));

    tracing::debug!(repo = %name, service = %service, ?encoding, "Dispatching RPC");
    let result = async {
        let repo = open_repo(&state, name).await?;
        serve_rpc(state.engine.clone(), repo, service, encoding, body).await
    }
    .await;

    match result {
        Ok(body) => (framing, body).into_response(),
        Err(e) => (framing, e).into_response(),
    }
}
