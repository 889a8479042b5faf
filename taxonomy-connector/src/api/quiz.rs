//! Skills quiz API handlers
//!
//! POST /api/v1/skills-quiz records a learner's current job; GET lists
//! recorded quizzes, optionally for one username. GET
//! /api/v1/learners-current-job reports each learner's latest job.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use taxonomy_common::db::SkillsQuiz;

use crate::config::is_valid_key;
use crate::db::jobs::get_job;
use crate::db::quiz::{insert_quiz, learners_current_jobs, list_quizzes, LearnerCurrentJob};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateQuizRequest {
    pub username: String,
    pub current_job_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QuizQuery {
    pub username: Option<String>,
}

/// POST /api/v1/skills-quiz
pub async fn create_quiz(
    State(state): State<AppState>,
    Json(request): Json<CreateQuizRequest>,
) -> ApiResult<(StatusCode, Json<SkillsQuiz>)> {
    if !is_valid_key(&request.username) {
        return Err(ApiError::BadRequest("username must not be empty".to_string()));
    }
    if let Some(job_id) = request.current_job_id {
        if get_job(&state.db, job_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown job {}", job_id)));
        }
    }

    let quiz = insert_quiz(&state.db, request.username.trim(), request.current_job_id).await?;
    tracing::info!(quiz_id = quiz.id, username = %quiz.username, "Skills quiz recorded");
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// GET /api/v1/skills-quiz
pub async fn list_quizzes_handler(
    State(state): State<AppState>,
    Query(query): Query<QuizQuery>,
) -> ApiResult<Json<Vec<SkillsQuiz>>> {
    let quizzes = list_quizzes(&state.db, query.username.as_deref()).await?;
    Ok(Json(quizzes))
}

/// GET /api/v1/learners-current-job
pub async fn learners_current_job_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LearnerCurrentJob>>> {
    Ok(Json(learners_current_jobs(&state.db).await?))
}

pub fn quiz_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/skills-quiz", get(list_quizzes_handler).post(create_quiz))
        .route("/api/v1/learners-current-job", get(learners_current_job_handler))
}
