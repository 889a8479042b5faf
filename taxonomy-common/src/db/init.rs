//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and brings the taxonomy
//! schema up with idempotent `CREATE TABLE IF NOT EXISTS` statements.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every taxonomy table (idempotent)
///
/// Foreign keys are enabled here so in-memory test pools get the same
/// cascade behavior as the file-backed pool.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;

    create_skills_table(pool).await?;
    create_industries_table(pool).await?;
    create_jobs_table(pool).await?;
    create_job_industries_table(pool).await?;
    create_job_skills_table(pool).await?;
    create_job_postings_table(pool).await?;

    // Content associations
    create_course_skills_table(pool).await?;
    create_program_skills_table(pool).await?;
    create_xblock_skills_table(pool).await?;
    create_xblock_skill_data_table(pool).await?;
    create_course_run_tracker_table(pool).await?;

    create_skills_quiz_table(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_skills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            info_url TEXT,
            type_id TEXT,
            type_name TEXT,
            category TEXT,
            subcategory TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_skills_name ON skills(name)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_industries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS industries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Jobs: `name` is nullable but unique when present (SQLite allows many NULLs)
async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            name TEXT UNIQUE,
            description TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_industries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_industries (
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            industry_id INTEGER NOT NULL REFERENCES industries(id) ON DELETE CASCADE,
            PRIMARY KEY (job_id, industry_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_skills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            skill_id INTEGER NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
            significance REAL,
            unique_postings INTEGER,
            is_blacklisted INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (job_id, skill_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_postings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_postings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL UNIQUE REFERENCES jobs(id) ON DELETE CASCADE,
            median_salary REAL,
            median_posting_duration INTEGER,
            unique_postings INTEGER,
            unique_companies INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_course_skills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_key TEXT NOT NULL,
            skill_id INTEGER NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
            confidence REAL NOT NULL DEFAULT 0,
            is_blacklisted INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (course_key, skill_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_program_skills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_uuid TEXT NOT NULL,
            skill_id INTEGER NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
            confidence REAL NOT NULL DEFAULT 0,
            is_blacklisted INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (program_uuid, skill_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_xblock_skills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS xblock_skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            usage_key TEXT NOT NULL UNIQUE,
            course_key TEXT,
            requires_verification INTEGER NOT NULL DEFAULT 1,
            auto_processed INTEGER NOT NULL DEFAULT 0,
            hash_content TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_xblock_skills_course ON xblock_skills(course_key)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Per (xblock, skill) vote counters and verification state
async fn create_xblock_skill_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS xblock_skill_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            xblock_id INTEGER NOT NULL REFERENCES xblock_skills(id) ON DELETE CASCADE,
            skill_id INTEGER NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
            verified_count INTEGER NOT NULL DEFAULT 0,
            ignored_count INTEGER NOT NULL DEFAULT 0,
            verified INTEGER NOT NULL DEFAULT 0,
            is_blacklisted INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (xblock_id, skill_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_course_run_tracker_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_run_xblock_skills_tracker (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_run_key TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_skills_quiz_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS skills_quiz (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            current_job_id INTEGER REFERENCES jobs(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_skills_quiz_job ON skills_quiz(current_job_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
