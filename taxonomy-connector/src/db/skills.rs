//! Skill persistence

use super::AssociationFilter;
use crate::pagination::Pagination;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use taxonomy_common::db::Skill;
use taxonomy_common::Result;

const SKILL_COLUMNS: &str = "id, external_id, name, description, info_url, type_id, type_name, \
                             category, subcategory, created_at, updated_at";

/// Skill fields reported by the vendor
#[derive(Debug, Clone, PartialEq)]
pub struct SkillInput {
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub info_url: Option<String>,
    pub type_id: Option<String>,
    pub type_name: Option<String>,
}

/// Insert or update a skill by external id, returning its row id
pub async fn upsert_skill<'e, E>(exec: E, input: &SkillInput) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO skills (external_id, name, description, info_url, type_id, type_name)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            info_url = excluded.info_url,
            type_id = excluded.type_id,
            type_name = excluded.type_name,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(&input.external_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.info_url)
    .bind(&input.type_id)
    .bind(&input.type_name)
    .fetch_one(exec)
    .await?;

    Ok(id)
}

pub async fn get_skill<'e, E>(exec: E, id: i64) -> Result<Option<Skill>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM skills WHERE id = ?", SKILL_COLUMNS);
    Ok(sqlx::query_as::<_, Skill>(&sql).bind(id).fetch_optional(exec).await?)
}

pub async fn get_skill_by_external_id<'e, E>(exec: E, external_id: &str) -> Result<Option<Skill>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM skills WHERE external_id = ?", SKILL_COLUMNS);
    Ok(sqlx::query_as::<_, Skill>(&sql)
        .bind(external_id)
        .fetch_optional(exec)
        .await?)
}

/// Map external ids to row ids; unknown ids are absent from the map
pub async fn skill_ids_by_external_id(
    conn: &mut SqliteConnection,
    external_ids: &[String],
) -> Result<HashMap<String, i64>> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT external_id, id FROM skills WHERE external_id IN (");
    let mut separated = builder.separated(", ");
    for external_id in external_ids {
        separated.push_bind(external_id);
    }
    separated.push_unseparated(")");

    let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(conn).await?;
    Ok(rows.into_iter().collect())
}

/// Page of skills, optionally restricted to exact names
pub async fn list_skills(
    pool: &SqlitePool,
    names: &[String],
    pagination: Pagination,
) -> Result<(Vec<Skill>, i64)> {
    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, names: &[String]) {
        if !names.is_empty() {
            builder.push(" WHERE name IN (");
            let mut separated = builder.separated(", ");
            for name in names {
                separated.push_bind(name.clone());
            }
            separated.push_unseparated(")");
        }
    }

    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM skills");
    push_filter(&mut count_query, names);
    let (count,): (i64,) = count_query.build_query_as().fetch_one(pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM skills", SKILL_COLUMNS));
    push_filter(&mut query, names);
    query
        .push(" ORDER BY id LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let skills = query.build_query_as::<Skill>().fetch_all(pool).await?;

    Ok((skills, count))
}

/// External ids of skills with at least one whitelisted content association
pub async fn whitelisted_skill_external_ids<'e, E>(exec: E) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT s.external_id FROM skills s
        WHERE EXISTS (SELECT 1 FROM course_skills cs WHERE cs.skill_id = s.id AND cs.is_blacklisted = 0)
           OR EXISTS (SELECT 1 FROM program_skills ps WHERE ps.skill_id = s.id AND ps.is_blacklisted = 0)
           OR EXISTS (SELECT 1 FROM xblock_skill_data xd WHERE xd.skill_id = s.id AND xd.is_blacklisted = 0)
        ORDER BY s.external_id
        "#,
    )
    .fetch_all(exec)
    .await?;

    Ok(ids)
}

/// Next chunk of skills lacking a category or subcategory, keyed after `after_id`
pub async fn skills_missing_details<'e, E>(exec: E, after_id: i64, limit: i64) -> Result<Vec<Skill>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM skills WHERE id > ? AND (category IS NULL OR subcategory IS NULL) ORDER BY id LIMIT ?",
        SKILL_COLUMNS
    );
    Ok(sqlx::query_as::<_, Skill>(&sql)
        .bind(after_id)
        .bind(limit)
        .fetch_all(exec)
        .await?)
}

/// Set a skill's category; a missing subcategory keeps the stored one
pub async fn update_skill_category<'e, E>(
    exec: E,
    id: i64,
    category: &str,
    subcategory: Option<&str>,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE skills SET category = ?, subcategory = COALESCE(?, subcategory), updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(category)
    .bind(subcategory)
    .bind(id)
    .execute(exec)
    .await?;

    Ok(())
}

/// Course keys associated with a skill
pub async fn course_keys_for_skill<'e, E>(
    exec: E,
    skill_id: i64,
    filter: AssociationFilter,
) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT cs.course_key FROM course_skills cs WHERE cs.skill_id = ? AND {} ORDER BY cs.course_key",
        filter.predicate("cs")
    );
    Ok(sqlx::query_scalar(&sql).bind(skill_id).fetch_all(exec).await?)
}

/// Xblock usage keys associated with a skill
pub async fn xblock_usage_keys_for_skill<'e, E>(
    exec: E,
    skill_id: i64,
    filter: AssociationFilter,
) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT x.usage_key FROM xblock_skill_data xd \
         JOIN xblock_skills x ON x.id = xd.xblock_id \
         WHERE xd.skill_id = ? AND {} ORDER BY x.usage_key",
        filter.predicate("xd")
    );
    Ok(sqlx::query_scalar(&sql).bind(skill_id).fetch_all(exec).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        taxonomy_common::db::init_schema(&pool).await.unwrap();
        pool
    }

    fn input(external_id: &str, name: &str) -> SkillInput {
        SkillInput {
            external_id: external_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            info_url: None,
            type_id: Some("ST1".to_string()),
            type_name: Some("Hard Skill".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let pool = setup_test_db().await;

        let first = upsert_skill(&pool, &input("KS1", "Rust")).await.unwrap();
        let second = upsert_skill(&pool, &input("KS1", "Rust Programming")).await.unwrap();
        assert_eq!(first, second);

        let skill = get_skill(&pool, first).await.unwrap().unwrap();
        assert_eq!(skill.name, "Rust Programming");
        assert_eq!(skill.type_name.as_deref(), Some("Hard Skill"));
    }

    #[tokio::test]
    async fn test_list_skills_filters_by_name() {
        let pool = setup_test_db().await;
        for (ext, name) in [("KS1", "Rust"), ("KS2", "Go"), ("KS3", "SQL")] {
            upsert_skill(&pool, &input(ext, name)).await.unwrap();
        }

        let (all, total) = list_skills(&pool, &[], Pagination::default()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);

        let names = vec!["Rust".to_string(), "SQL".to_string()];
        let (some, total) = list_skills(&pool, &names, Pagination::default()).await.unwrap();
        assert_eq!(total, 2);
        assert!(some.iter().all(|s| s.name != "Go"));
    }

    #[tokio::test]
    async fn test_external_id_lookup_map() {
        let pool = setup_test_db().await;
        let id = upsert_skill(&pool, &input("KS1", "Rust")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let map = skill_ids_by_external_id(&mut conn, &["KS1".to_string(), "KS404".to_string()])
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["KS1"], id);
    }

    #[tokio::test]
    async fn test_category_update_keeps_stored_subcategory() {
        let pool = setup_test_db().await;
        let id = upsert_skill(&pool, &input("KS1", "Rust")).await.unwrap();

        update_skill_category(&pool, id, "IT", Some("Software")).await.unwrap();
        update_skill_category(&pool, id, "Information Technology", None).await.unwrap();

        let skill = get_skill(&pool, id).await.unwrap().unwrap();
        assert_eq!(skill.category.as_deref(), Some("Information Technology"));
        assert_eq!(skill.subcategory.as_deref(), Some("Software"));
    }
}
