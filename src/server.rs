//! Read-only HTTP search endpoint.
//!
//! `GET /api/search?q=<query>&top=<n>` → `{"results": [{doc_id, score, title,
//! snippet}]}`; a missing or blank `q` is a 400 with `{"error": ...}`.
//! The index is loaded once and shared across requests behind an `Arc`;
//! ranking runs on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::model::types::SearchHit;
use crate::search::ranker::Ranker;

pub const DEFAULT_TOP: usize = 10;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind: SocketAddr,
    pub default_top: usize,
    /// Upper bound on `top` per request.
    pub max_top: usize,
    pub expand: bool,
}

#[derive(Clone)]
pub struct AppState {
    ranker: Arc<Ranker>,
    default_top: usize,
    max_top: usize,
    expand: bool,
}

impl AppState {
    pub fn new(ranker: Arc<Ranker>, opts: &ServeOptions) -> Self {
        Self {
            ranker,
            default_top: opts.default_top.max(1),
            max_top: opts.max_top.max(1),
            expand: opts.expand,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    /// Kept as text so a malformed value gets a JSON error body.
    #[serde(default)]
    pub top: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/search", get(search_handler))
        .with_state(state)
}

pub async fn serve(ranker: Arc<Ranker>, opts: ServeOptions) -> Result<()> {
    let docs = ranker.index().len();
    let app = router(AppState::new(ranker, &opts));
    let listener = tokio::net::TcpListener::bind(opts.bind)
        .await
        .with_context(|| format!("failed to bind {}", opts.bind))?;
    let addr = listener.local_addr().context("read bound address")?;
    tracing::info!(%addr, docs, "search API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    tracing::info!("search API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(bad_request("missing query"));
    }
    let top = match params.top.as_deref().map(str::trim) {
        None | Some("") => state.default_top,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| bad_request(format!("invalid top value {raw:?}")))?,
    }
    .min(state.max_top);

    let query = query.to_string();
    let ranker = Arc::clone(&state.ranker);
    let expand = state.expand;
    let started = std::time::Instant::now();
    let results = tokio::task::spawn_blocking(move || ranker.search_with_snippets(&query, top, expand))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;
    tracing::debug!(
        top,
        hits = results.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "search request served"
    );
    Ok(Json(SearchResponse { results }))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn internal_error(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "search request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}
