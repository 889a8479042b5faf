//! Skills quiz records (learner's current job)

use serde::Serialize;
use sqlx::{Executor, Sqlite};
use taxonomy_common::db::SkillsQuiz;
use taxonomy_common::Result;

/// Rows scanned when collecting job-holder usernames
pub const USERNAME_SCAN_LIMIT: i64 = 5000;

/// Distinct usernames returned per job
pub const MAX_JOB_HOLDER_USERNAMES: usize = 100;

pub async fn insert_quiz<'e, E>(exec: E, username: &str, current_job_id: Option<i64>) -> Result<SkillsQuiz>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, SkillsQuiz>(
        "INSERT INTO skills_quiz (username, current_job_id) VALUES (?, ?)
         RETURNING id, username, current_job_id, created_at",
    )
    .bind(username)
    .bind(current_job_id)
    .fetch_one(exec)
    .await?)
}

pub async fn list_quizzes<'e, E>(exec: E, username: Option<&str>) -> Result<Vec<SkillsQuiz>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, SkillsQuiz>(
        "SELECT id, username, current_job_id, created_at FROM skills_quiz
         WHERE (?1 IS NULL OR username = ?1) ORDER BY id DESC",
    )
    .bind(username)
    .fetch_all(exec)
    .await?)
}

/// Distinct usernames whose current job is `job_id`, most recent first
pub async fn job_holder_usernames<'e, E>(exec: E, job_id: i64) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT username FROM skills_quiz WHERE current_job_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(job_id)
    .bind(USERNAME_SCAN_LIMIT)
    .fetch_all(exec)
    .await?;

    let mut seen = std::collections::HashSet::new();
    Ok(rows
        .into_iter()
        .filter(|u| seen.insert(u.clone()))
        .take(MAX_JOB_HOLDER_USERNAMES)
        .collect())
}

/// A learner's job according to their latest quiz
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LearnerCurrentJob {
    pub username: String,
    pub current_job: i64,
}

/// Latest current job per learner; learners whose latest quiz names no job are left out
pub async fn learners_current_jobs<'e, E>(exec: E) -> Result<Vec<LearnerCurrentJob>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, LearnerCurrentJob>(
        "SELECT q.username, q.current_job_id AS current_job FROM skills_quiz q
         WHERE q.id = (SELECT MAX(id) FROM skills_quiz WHERE username = q.username)
           AND q.current_job_id IS NOT NULL
         ORDER BY q.username",
    )
    .fetch_all(exec)
    .await?)
}
