//! XBlock skill API handlers

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::skills::split_csv;
use crate::db::xblocks::{get_xblock_with_skills, list_xblocks, XBlockWithSkills};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, Pagination};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct XBlockListQuery {
    /// Comma-separated usage keys
    pub usage_key: Option<String>,
    /// Restrict attached skills to verified (true) or unverified (false)
    pub verified: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// GET /api/v1/xblocks
pub async fn list_xblocks_handler(
    State(state): State<AppState>,
    Query(query): Query<XBlockListQuery>,
) -> ApiResult<Json<Page<XBlockWithSkills>>> {
    let pagination = Pagination::new(query.page, query.page_size);
    let usage_keys = split_csv(query.usage_key.as_deref());

    let (xblocks, count) = list_xblocks(&state.db, &usage_keys, query.verified, pagination).await?;
    Ok(Json(Page::new(xblocks, count, pagination)))
}

/// GET /api/v1/xblocks/:id
pub async fn get_xblock_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<XBlockWithSkills>> {
    let xblock = get_xblock_with_skills(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("XBlock {}", id)))?;
    Ok(Json(xblock))
}

pub fn xblock_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/xblocks", get(list_xblocks_handler))
        .route("/api/v1/xblocks/:id", get(get_xblock_handler))
}
