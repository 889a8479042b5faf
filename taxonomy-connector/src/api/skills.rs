//! Skill API handlers
//!
//! GET /api/v1/skills, GET /api/v1/skills/:id

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use taxonomy_common::db::Skill;

use crate::db::skills::{course_keys_for_skill, get_skill, list_skills, xblock_usage_keys_for_skill};
use crate::db::AssociationFilter;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, Pagination};
use crate::AppState;

/// Split a comma-separated query value, dropping empty entries
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct SkillListQuery {
    /// Comma-separated exact skill names
    pub name: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SkillDetailResponse {
    #[serde(flatten)]
    pub skill: Skill,
    pub courses: Vec<String>,
    pub xblocks: Vec<String>,
}

/// GET /api/v1/skills
pub async fn list_skills_handler(
    State(state): State<AppState>,
    Query(query): Query<SkillListQuery>,
) -> ApiResult<Json<Page<Skill>>> {
    let pagination = Pagination::new(query.page, query.page_size);
    let names = split_csv(query.name.as_deref());

    let (skills, count) = list_skills(&state.db, &names, pagination).await?;
    Ok(Json(Page::new(skills, count, pagination)))
}

/// GET /api/v1/skills/:id
pub async fn get_skill_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SkillDetailResponse>> {
    let skill = get_skill(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Skill {}", id)))?;

    let courses = course_keys_for_skill(&state.db, id, AssociationFilter::Whitelisted).await?;
    let xblocks = xblock_usage_keys_for_skill(&state.db, id, AssociationFilter::Whitelisted).await?;

    Ok(Json(SkillDetailResponse {
        skill,
        courses,
        xblocks,
    }))
}

pub fn skill_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/skills", get(list_skills_handler))
        .route("/api/v1/skills/:id", get(get_skill_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv(Some("a, b,,c ")), vec!["a", "b", "c"]);
        assert!(split_csv(Some("")).is_empty());
        assert!(split_csv(None).is_empty());
    }
}
