//! Job posting statistics

use crate::pagination::Pagination;
use sqlx::{Executor, Sqlite, SqlitePool};
use taxonomy_common::db::JobPosting;
use taxonomy_common::Result;

const POSTING_COLUMNS: &str = "id, job_id, median_salary, median_posting_duration, unique_postings, \
                               unique_companies, created_at, updated_at";

/// Vendor posting statistics for one job; every field may be missing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPostingInput {
    pub median_salary: Option<f64>,
    pub median_posting_duration: Option<i64>,
    pub unique_postings: Option<i64>,
    pub unique_companies: Option<i64>,
}

pub async fn upsert_job_posting<'e, E>(exec: E, job_id: i64, input: &JobPostingInput) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO job_postings
            (job_id, median_salary, median_posting_duration, unique_postings, unique_companies)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            median_salary = excluded.median_salary,
            median_posting_duration = excluded.median_posting_duration,
            unique_postings = excluded.unique_postings,
            unique_companies = excluded.unique_companies,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(job_id)
    .bind(input.median_salary)
    .bind(input.median_posting_duration)
    .bind(input.unique_postings)
    .bind(input.unique_companies)
    .execute(exec)
    .await?;

    Ok(())
}

pub async fn get_job_posting<'e, E>(exec: E, id: i64) -> Result<Option<JobPosting>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM job_postings WHERE id = ?", POSTING_COLUMNS);
    Ok(sqlx::query_as::<_, JobPosting>(&sql).bind(id).fetch_optional(exec).await?)
}

pub async fn job_posting_for_job<'e, E>(exec: E, job_id: i64) -> Result<Option<JobPosting>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM job_postings WHERE job_id = ?", POSTING_COLUMNS);
    Ok(sqlx::query_as::<_, JobPosting>(&sql)
        .bind(job_id)
        .fetch_optional(exec)
        .await?)
}

pub async fn list_job_postings(
    pool: &SqlitePool,
    pagination: Pagination,
) -> Result<(Vec<JobPosting>, i64)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_postings")
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM job_postings ORDER BY id LIMIT ? OFFSET ?",
        POSTING_COLUMNS
    );
    let postings = sqlx::query_as::<_, JobPosting>(&sql)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

    Ok((postings, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::jobs::upsert_job;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_one_posting_per_job() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        taxonomy_common::db::init_schema(&pool).await.unwrap();
        let job = upsert_job(&pool, "ET1").await.unwrap();

        let first = JobPostingInput {
            median_salary: Some(45000.34),
            median_posting_duration: Some(30),
            unique_postings: Some(100),
            unique_companies: None,
        };
        upsert_job_posting(&pool, job, &first).await.unwrap();
        upsert_job_posting(&pool, job, &JobPostingInput::default()).await.unwrap();

        let (postings, count) = list_job_postings(&pool, Pagination::default()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(postings[0].median_salary, None);

        let by_job = job_posting_for_job(&pool, job).await.unwrap().unwrap();
        assert_eq!(by_job.id, postings[0].id);
    }
}
