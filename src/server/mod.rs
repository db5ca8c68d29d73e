//! HTTP boundary for the retriever
//!
//! `POST /semantic` (and `POST /`) keep the response shape existing front-ends
//! read: an object keyed by rank whose values are themselves JSON strings of
//! `{url, title}`. `POST /v1/search` returns the same hits as plain objects.


use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::SearchError;
use crate::config::RetrievalConfig;
use crate::retrieval::{Retriever, SearchResult};

#[derive(Clone)]
pub struct AppState {
    retriever: Arc<Retriever>,
    retrieval: RetrievalConfig,
}

impl AppState {
    #[inline]
    pub fn new(retriever: Arc<Retriever>, retrieval: RetrievalConfig) -> Self {
        Self {
            retriever,
            retrieval,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub hyde: Option<bool>,
}

/// Hit as serialized inside the legacy response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    /// The matched block, not the document title.
    pub title: String,
}

/// `{"0": "<json>", "1": "<json>", ...}` in rank order.
#[derive(Debug)]
pub struct LegacyResponse(Vec<String>);

impl Serialize for LegacyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (rank, encoded) in self.0.iter().enumerate() {
            map.serialize_entry(&rank.to_string(), encoded)?;
        }
        map.end()
    }
}

impl LegacyResponse {
    fn from_results(results: &[SearchResult]) -> Result<Self, ApiError> {
        results
            .iter()
            .map(|result| {
                serde_json::to_string(&Link {
                    url: result.url().to_string(),
                    title: result.text.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|e| ApiError::internal(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ResponseHit>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseHit {
    pub url: String,
    pub title: String,
    pub authors: Vec<String>,
    pub date: String,
    pub tags: String,
    pub text: String,
    pub score: f32,
}

impl From<SearchResult> for ResponseHit {
    fn from(result: SearchResult) -> Self {
        Self {
            url: result.source.url,
            title: result.source.title,
            authors: result.source.authors,
            date: result.source.date_published,
            tags: result.source.tags,
            text: result.text,
            score: result.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub k: usize,
    pub hyde: bool,
    pub latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        let status = match &error {
            SearchError::Provider(_) | SearchError::ExhaustedRetries { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SearchError::CorpusUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!("Search failed: {}", error);
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(legacy_handler))
        .route("/semantic", post(legacy_handler))
        .route("/v1/search", post(search_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
#[inline]
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn legacy_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<LegacyResponse>, ApiError> {
    let Json(request) = payload?;
    let (results, _, _) = run_search(&state, request).await?;
    Ok(Json(LegacyResponse::from_results(&results)?))
}

async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload?;
    let start = Instant::now();
    let (results, k, hyde) = run_search(&state, request).await?;

    Ok(Json(SearchResponse {
        results: results.into_iter().map(ResponseHit::from).collect(),
        meta: ResponseMeta {
            k,
            hyde,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }))
}

async fn run_search(
    state: &AppState,
    request: SearchRequest,
) -> Result<(Vec<SearchResult>, usize, bool), ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let k = state.retrieval.effective_k(request.k);
    let hyde = request.hyde.unwrap_or(state.retrieval.hyde);
    let retriever = Arc::clone(&state.retriever);

    let results = tokio::task::spawn_blocking(move || retriever.top_k(&request.query, k, hyde))
        .await
        .map_err(|e| ApiError::internal(format!("search task failed: {e}")))??;

    Ok((results, k, hyde))
}
