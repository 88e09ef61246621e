//! Read-only HTTP surface.
//!
//! Handlers only ever read the cache; an absent key is answered with
//! `204 No Content`, never by querying the store.

use std::path::Path;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use feedme_core::{CacheError, Period, SharedCache, ARTICLES_KEY};
use serde::Serialize;
use thiserror::Error;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    cache: SharedCache,
}

impl ApiState {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown period {0:?}, expected \"today\" or \"month\"")]
    UnknownPeriod(String),
    #[error("cache backend unavailable")]
    CacheUnavailable(#[source] CacheError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::UnknownPeriod(_) => (StatusCode::NOT_FOUND, "unknown_period"),
            ApiError::CacheUnavailable(err) => {
                warn!(error = %err, "cache read failed");
                (StatusCode::SERVICE_UNAVAILABLE, "cache_unavailable")
            }
        };
        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the full router: JSON API, landing page and static assets.
pub fn router(state: ApiState, views_dir: &Path, assets_dir: &Path) -> Router {
    Router::new()
        .route("/api/v1/articles", get(articles_all))
        .route("/api/v1/articles/{period}", get(articles_period))
        .route("/health", get(health))
        .route_service("/", ServeFile::new(views_dir.join("index.html")))
        .nest_service("/assets", ServeDir::new(assets_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn articles_all(State(state): State<ApiState>) -> Result<Response, ApiError> {
    cached_payload(&state.cache, ARTICLES_KEY).await
}

async fn articles_period(
    State(state): State<ApiState>,
    UrlPath(period): UrlPath<String>,
) -> Result<Response, ApiError> {
    let period = Period::parse(&period).ok_or(ApiError::UnknownPeriod(period))?;
    cached_payload(&state.cache, period.cache_key()).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Returns the cached payload verbatim, or 204 when nothing is cached yet.
async fn cached_payload(cache: &SharedCache, key: &str) -> Result<Response, ApiError> {
    match cache.get(key).await.map_err(ApiError::CacheUnavailable)? {
        Some(payload) if !payload.is_empty() => Ok((
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response()),
        _ => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
