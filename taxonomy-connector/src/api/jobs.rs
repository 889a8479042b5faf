//! Job and job posting API handlers

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use taxonomy_common::db::{Job, JobPosting};

use crate::db::job_postings::{get_job_posting, list_job_postings};
use crate::db::jobs::{
    get_job, industry_names_for_job, job_skills, job_top_skill_categories, list_jobs, JobSkillDetail,
    SkillCategoryGroup,
};
use crate::db::quiz::job_holder_usernames;
use crate::db::AssociationFilter;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, Pagination};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetailResponse {
    #[serde(flatten)]
    pub job: Job,
    pub skills: Vec<JobSkillDetail>,
    pub industry_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobTopCategoriesResponse {
    pub id: i64,
    pub name: Option<String>,
    pub skill_categories: Vec<SkillCategoryGroup>,
}

#[derive(Debug, Serialize)]
pub struct JobHolderUsernamesResponse {
    pub usernames: Vec<String>,
}

/// GET /api/v1/jobs
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<Job>>> {
    let pagination = query.pagination();
    let (jobs, count) = list_jobs(&state.db, pagination).await?;
    Ok(Json(Page::new(jobs, count, pagination)))
}

/// GET /api/v1/jobs/:id
pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobDetailResponse>> {
    let job = get_job(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {}", id)))?;
    let skills = job_skills(&state.db, id, AssociationFilter::Whitelisted).await?;
    let industry_names = industry_names_for_job(&state.db, id).await?;

    Ok(Json(JobDetailResponse {
        job,
        skills,
        industry_names,
    }))
}

/// GET /api/v1/jobpostings
pub async fn list_job_postings_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<JobPosting>>> {
    let pagination = query.pagination();
    let (postings, count) = list_job_postings(&state.db, pagination).await?;
    Ok(Json(Page::new(postings, count, pagination)))
}

/// GET /api/v1/jobpostings/:id
pub async fn get_job_posting_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobPosting>> {
    let posting = get_job_posting(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job posting {}", id)))?;
    Ok(Json(posting))
}

/// GET /api/v1/job-holder-usernames/:job_id
///
/// Up to 100 distinct quiz-takers currently holding the job, most recent first.
pub async fn job_holder_usernames_handler(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobHolderUsernamesResponse>> {
    if get_job(&state.db, job_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Job {}", job_id)));
    }

    let usernames = job_holder_usernames(&state.db, job_id).await?;
    Ok(Json(JobHolderUsernamesResponse { usernames }))
}

/// GET /api/v1/job-top-subcategories/:job_id
pub async fn job_top_subcategories_handler(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobTopCategoriesResponse>> {
    let job = get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {}", job_id)))?;
    let skill_categories = job_top_skill_categories(&state.db, job_id).await?;

    Ok(Json(JobTopCategoriesResponse {
        id: job.id,
        name: job.name,
        skill_categories,
    }))
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/jobs", get(list_jobs_handler))
        .route("/api/v1/jobs/:id", get(get_job_handler))
        .route("/api/v1/jobpostings", get(list_job_postings_handler))
        .route("/api/v1/jobpostings/:id", get(get_job_posting_handler))
        .route(
            "/api/v1/job-holder-usernames/:job_id",
            get(job_holder_usernames_handler),
        )
        .route(
            "/api/v1/job-top-subcategories/:job_id",
            get(job_top_subcategories_handler),
        )
}
