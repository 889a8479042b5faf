//! Schema creation tests

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use taxonomy_common::db::{init_database, init_schema};
use tempfile::TempDir;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
}

#[tokio::test]
async fn test_init_database_creates_file_and_tables() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("data").join("taxonomy.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables = table_names(&pool).await;
    for expected in [
        "course_run_xblock_skills_tracker",
        "course_skills",
        "industries",
        "job_industries",
        "job_postings",
        "job_skills",
        "jobs",
        "program_skills",
        "settings",
        "skills",
        "skills_quiz",
        "xblock_skill_data",
        "xblock_skills",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_init_schema_is_idempotent() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();
    init_schema(&pool).await.unwrap();
}

#[tokio::test]
async fn test_skill_pair_uniqueness_enforced() {
    let pool = memory_pool().await;

    sqlx::query("INSERT INTO skills (external_id, name) VALUES ('KS1', 'Rust')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO course_skills (course_key, skill_id, confidence) VALUES ('course-v1:a', 1, 0.9)")
        .execute(&pool)
        .await
        .unwrap();

    let dup = sqlx::query("INSERT INTO course_skills (course_key, skill_id, confidence) VALUES ('course-v1:a', 1, 0.5)")
        .execute(&pool)
        .await;
    let err = taxonomy_common::Error::from(dup.unwrap_err());
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_job_name_nullable_but_unique() {
    let pool = memory_pool().await;

    for ext in ["J1", "J2"] {
        sqlx::query("INSERT INTO jobs (external_id) VALUES (?)")
            .bind(ext)
            .execute(&pool)
            .await
            .unwrap();
    }

    sqlx::query("UPDATE jobs SET name = 'Engineer' WHERE external_id = 'J1'")
        .execute(&pool)
        .await
        .unwrap();
    let collision = sqlx::query("UPDATE jobs SET name = 'Engineer' WHERE external_id = 'J2'")
        .execute(&pool)
        .await;
    assert!(collision.is_err());
}

#[tokio::test]
async fn test_deleting_xblock_cascades_to_skill_data() {
    let pool = memory_pool().await;

    sqlx::query("INSERT INTO skills (external_id, name) VALUES ('KS1', 'Rust')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO xblock_skills (usage_key) VALUES ('block-v1:x')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO xblock_skill_data (xblock_id, skill_id) VALUES (1, 1)")
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query("DELETE FROM xblock_skills WHERE usage_key = 'block-v1:x'")
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM xblock_skill_data")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}
