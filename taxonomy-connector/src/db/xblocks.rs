//! XBlock skill tags, vote counters and the course-run tracker

use crate::pagination::Pagination;
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use taxonomy_common::db::{XBlockSkillData, XBlockSkills};
use taxonomy_common::Result;

const XBLOCK_COLUMNS: &str = "id, usage_key, course_key, requires_verification, auto_processed, \
                              hash_content, created_at, updated_at";

const DATA_COLUMNS: &str = "id, xblock_id, skill_id, verified_count, ignored_count, verified, \
                            is_blacklisted, created_at, updated_at";

/// Which counter a learner vote increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Verified,
    Ignored,
}

impl Vote {
    fn column(&self) -> &'static str {
        match self {
            Vote::Verified => "verified_count",
            Vote::Ignored => "ignored_count",
        }
    }
}

pub async fn get_xblock<'e, E>(exec: E, usage_key: &str) -> Result<Option<XBlockSkills>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM xblock_skills WHERE usage_key = ?", XBLOCK_COLUMNS);
    Ok(sqlx::query_as::<_, XBlockSkills>(&sql)
        .bind(usage_key)
        .fetch_optional(exec)
        .await?)
}

pub async fn get_xblock_by_id<'e, E>(exec: E, id: i64) -> Result<Option<XBlockSkills>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM xblock_skills WHERE id = ?", XBLOCK_COLUMNS);
    Ok(sqlx::query_as::<_, XBlockSkills>(&sql).bind(id).fetch_optional(exec).await?)
}

/// Record a tagged xblock and its content hash, marking it auto-processed
pub async fn upsert_xblock<'e, E>(
    exec: E,
    usage_key: &str,
    course_key: Option<&str>,
    hash_content: &str,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO xblock_skills (usage_key, course_key, hash_content, auto_processed)
        VALUES (?, ?, ?, 1)
        ON CONFLICT(usage_key) DO UPDATE SET
            course_key = COALESCE(excluded.course_key, xblock_skills.course_key),
            hash_content = excluded.hash_content,
            auto_processed = 1,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(usage_key)
    .bind(course_key)
    .bind(hash_content)
    .fetch_one(exec)
    .await?;

    Ok(id)
}

/// Another auto-processed xblock already tagged from identical content
pub async fn find_processed_xblock_with_hash<'e, E>(
    exec: E,
    hash_content: &str,
    exclude_usage_key: &str,
) -> Result<Option<XBlockSkills>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM xblock_skills \
         WHERE hash_content = ? AND auto_processed = 1 AND usage_key != ? \
         ORDER BY id LIMIT 1",
        XBLOCK_COLUMNS
    );
    Ok(sqlx::query_as::<_, XBlockSkills>(&sql)
        .bind(hash_content)
        .bind(exclude_usage_key)
        .fetch_optional(exec)
        .await?)
}

/// Attach a skill to an xblock; an existing pair is left untouched
pub async fn upsert_xblock_skill<'e, E>(exec: E, xblock_id: i64, skill_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO xblock_skill_data (xblock_id, skill_id) VALUES (?, ?)
         ON CONFLICT(xblock_id, skill_id) DO NOTHING",
    )
    .bind(xblock_id)
    .bind(skill_id)
    .execute(exec)
    .await?;

    Ok(())
}

/// Copy whitelisted skill ids from one xblock to another with fresh counters
pub async fn copy_xblock_skills(
    conn: &mut SqliteConnection,
    from_xblock_id: i64,
    to_xblock_id: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO xblock_skill_data (xblock_id, skill_id)
        SELECT ?, skill_id FROM xblock_skill_data
        WHERE xblock_id = ? AND is_blacklisted = 0
        ON CONFLICT(xblock_id, skill_id) DO NOTHING
        "#,
    )
    .bind(to_xblock_id)
    .bind(from_xblock_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Create `usage_key` as a copy of `source_usage_key`
///
/// Returns the number of copied associations, or `None` when the source
/// xblock has never been tagged.
pub async fn duplicate_xblock(
    conn: &mut SqliteConnection,
    source_usage_key: &str,
    usage_key: &str,
    course_key: Option<&str>,
) -> Result<Option<u64>> {
    let Some(source) = get_xblock(&mut *conn, source_usage_key).await? else {
        return Ok(None);
    };

    let target_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO xblock_skills (usage_key, course_key, requires_verification, auto_processed, hash_content)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(usage_key) DO UPDATE SET
            course_key = excluded.course_key,
            requires_verification = excluded.requires_verification,
            auto_processed = excluded.auto_processed,
            hash_content = excluded.hash_content,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(usage_key)
    .bind(course_key)
    .bind(source.requires_verification)
    .bind(source.auto_processed)
    .bind(&source.hash_content)
    .fetch_one(&mut *conn)
    .await?;

    let copied = copy_xblock_skills(conn, source.id, target_id).await?;
    Ok(Some(copied))
}

/// Delete an xblock; its skill data cascades
pub async fn delete_xblock<'e, E>(exec: E, usage_key: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM xblock_skills WHERE usage_key = ?")
        .bind(usage_key)
        .execute(exec)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Add one vote to each listed skill of an xblock
///
/// Only open rows are counted: finalized (verified or blacklisted) rows keep
/// their counters. Returns the number of rows incremented.
pub async fn increment_vote_counts<'e, E>(
    exec: E,
    xblock_id: i64,
    skill_ids: &[i64],
    vote: Vote,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if skill_ids.is_empty() {
        return Ok(0);
    }

    let column = vote.column();
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "UPDATE xblock_skill_data SET {column} = {column} + 1, updated_at = CURRENT_TIMESTAMP \
         WHERE verified = 0 AND is_blacklisted = 0 AND xblock_id = "
    ));
    builder.push_bind(xblock_id).push(" AND skill_id IN (");
    let mut separated = builder.separated(", ");
    for skill_id in skill_ids {
        separated.push_bind(*skill_id);
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(exec).await?;
    Ok(result.rows_affected())
}

/// Next chunk of open rows with enough votes to finalize, keyed after `after_id`
pub async fn fetch_finalization_candidates<'e, E>(
    exec: E,
    after_id: i64,
    min_votes: i64,
    limit: i64,
) -> Result<Vec<XBlockSkillData>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM xblock_skill_data \
         WHERE id > ? AND verified = 0 AND is_blacklisted = 0 \
           AND verified_count + ignored_count >= ? \
         ORDER BY id LIMIT ?",
        DATA_COLUMNS
    );
    Ok(sqlx::query_as::<_, XBlockSkillData>(&sql)
        .bind(after_id)
        .bind(min_votes)
        .bind(limit)
        .fetch_all(exec)
        .await?)
}

/// Mark an open row verified
pub async fn mark_verified<'e, E>(exec: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE xblock_skill_data SET verified = 1, is_blacklisted = 0, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND verified = 0 AND is_blacklisted = 0",
    )
    .bind(id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark an open row blacklisted
pub async fn mark_blacklisted<'e, E>(exec: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE xblock_skill_data SET is_blacklisted = 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND verified = 0 AND is_blacklisted = 0",
    )
    .bind(id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_xblock_skill_data<'e, E>(exec: E, xblock_id: i64) -> Result<Vec<XBlockSkillData>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM xblock_skill_data WHERE xblock_id = ? ORDER BY id",
        DATA_COLUMNS
    );
    Ok(sqlx::query_as::<_, XBlockSkillData>(&sql)
        .bind(xblock_id)
        .fetch_all(exec)
        .await?)
}

/// Skill shown under an xblock
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ShortSkill {
    pub id: i64,
    pub name: String,
}

/// XBlock with its whitelisted skills
#[derive(Debug, Clone, Serialize)]
pub struct XBlockWithSkills {
    #[serde(flatten)]
    pub xblock: XBlockSkills,
    pub skills: Vec<ShortSkill>,
}

/// Page of xblocks with whitelisted skills attached
///
/// `verified` narrows the attached skills, not the xblocks.
pub async fn list_xblocks(
    pool: &SqlitePool,
    usage_keys: &[String],
    verified: Option<bool>,
    pagination: Pagination,
) -> Result<(Vec<XBlockWithSkills>, i64)> {
    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, usage_keys: &[String]) {
        if !usage_keys.is_empty() {
            builder.push(" WHERE usage_key IN (");
            let mut separated = builder.separated(", ");
            for key in usage_keys {
                separated.push_bind(key.clone());
            }
            separated.push_unseparated(")");
        }
    }

    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM xblock_skills");
    push_filter(&mut count_query, usage_keys);
    let (count,): (i64,) = count_query.build_query_as().fetch_one(pool).await?;

    let mut query =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM xblock_skills", XBLOCK_COLUMNS));
    push_filter(&mut query, usage_keys);
    query
        .push(" ORDER BY id LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let xblocks = query.build_query_as::<XBlockSkills>().fetch_all(pool).await?;

    let mut skills = skills_for_xblocks(pool, &xblocks.iter().map(|x| x.id).collect::<Vec<_>>(), verified).await?;

    let results = xblocks
        .into_iter()
        .map(|xblock| {
            let skills = skills.remove(&xblock.id).unwrap_or_default();
            XBlockWithSkills { xblock, skills }
        })
        .collect();

    Ok((results, count))
}

pub async fn get_xblock_with_skills(pool: &SqlitePool, id: i64) -> Result<Option<XBlockWithSkills>> {
    let Some(xblock) = get_xblock_by_id(pool, id).await? else {
        return Ok(None);
    };
    let mut skills = skills_for_xblocks(pool, &[xblock.id], None).await?;
    let skills = skills.remove(&xblock.id).unwrap_or_default();
    Ok(Some(XBlockWithSkills { xblock, skills }))
}

async fn skills_for_xblocks(
    pool: &SqlitePool,
    xblock_ids: &[i64],
    verified: Option<bool>,
) -> Result<HashMap<i64, Vec<ShortSkill>>> {
    let mut grouped: HashMap<i64, Vec<ShortSkill>> = HashMap::new();
    if xblock_ids.is_empty() {
        return Ok(grouped);
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT xd.xblock_id, s.id, s.name FROM xblock_skill_data xd \
         JOIN skills s ON s.id = xd.skill_id \
         WHERE xd.is_blacklisted = 0",
    );
    if let Some(verified) = verified {
        builder.push(" AND xd.verified = ").push_bind(verified);
    }
    builder.push(" AND xd.xblock_id IN (");
    let mut separated = builder.separated(", ");
    for id in xblock_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY xd.xblock_id, s.name");

    let rows: Vec<(i64, i64, String)> = builder.build_query_as().fetch_all(pool).await?;
    for (xblock_id, id, name) in rows {
        grouped.entry(xblock_id).or_default().push(ShortSkill { id, name });
    }

    Ok(grouped)
}

pub async fn is_course_run_processed<'e, E>(exec: E, course_run_key: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM course_run_xblock_skills_tracker WHERE course_run_key = ?")
            .bind(course_run_key)
            .fetch_optional(exec)
            .await?;

    Ok(found.is_some())
}

pub async fn mark_course_run_processed<'e, E>(exec: E, course_run_key: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO course_run_xblock_skills_tracker (course_run_key) VALUES (?)
         ON CONFLICT(course_run_key) DO NOTHING",
    )
    .bind(course_run_key)
    .execute(exec)
    .await?;

    Ok(())
}
