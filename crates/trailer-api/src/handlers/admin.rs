//! Admin endpoints (§6): cache invalidation, archive-cookie rotation seed,
//! and a tracker stats dump. Unlike the resolution endpoint, these surface
//! real errors through `ApiError`.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use trailer_models::{ArchiveCookie, SuccessStat};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn delete_cache_entry(State(state): State<AppState>, Path(imdb_id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.cache.delete(&imdb_id).await;
    Ok(Json(serde_json::json!({ "deleted": imdb_id })))
}

pub async fn delete_all_cache(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.cache.delete_all().await;
    Ok(Json(serde_json::json!({ "deleted": "all" })))
}

#[derive(Deserialize)]
pub struct SeedCookieRequest {
    pub cookies: String,
    pub email: Option<String>,
}

pub async fn seed_archive_cookie(State(state): State<AppState>, Json(req): Json<SeedCookieRequest>) -> ApiResult<Json<serde_json::Value>> {
    if req.cookies.trim().is_empty() {
        return Err(crate::error::ApiError::bad_request("cookies must not be empty"));
    }
    state.cookies.seed(req.cookies, req.email).await;
    Ok(Json(serde_json::json!({ "seeded": true })))
}

#[derive(Serialize)]
pub struct CookieSummary {
    pub id: i64,
    pub email: Option<String>,
    pub is_valid: bool,
    pub use_count: u64,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ArchiveCookie> for CookieSummary {
    fn from(c: ArchiveCookie) -> Self {
        Self {
            id: c.id,
            email: c.email,
            is_valid: c.is_valid,
            use_count: c.use_count,
            last_used: c.last_used,
        }
    }
}

pub async fn list_archive_cookies(State(state): State<AppState>) -> ApiResult<Json<Vec<CookieSummary>>> {
    let cookies = state.cookies.list().await;
    Ok(Json(cookies.into_iter().map(CookieSummary::from).collect()))
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub cache_size: usize,
    pub sources: Vec<SuccessStat>,
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        cache_size: state.cache.len().await,
        sources: state.tracker.snapshot().await,
    }))
}
