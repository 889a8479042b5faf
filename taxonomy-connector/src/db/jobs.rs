//! Job, job-skill and industry persistence

use super::AssociationFilter;
use crate::pagination::Pagination;
use serde::Serialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use taxonomy_common::db::Job;
use taxonomy_common::Result;

const JOB_COLUMNS: &str = "id, external_id, name, description, created_at, updated_at";

/// Insert a job by external id if absent, returning its row id
pub async fn upsert_job<'e, E>(exec: E, external_id: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (external_id) VALUES (?)
        ON CONFLICT(external_id) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
        RETURNING id
        "#,
    )
    .bind(external_id)
    .fetch_one(exec)
    .await?;

    Ok(id)
}

/// Insert or refresh a job-skill association; blacklisted pairs are left alone
pub async fn upsert_job_skill<'e, E>(
    exec: E,
    job_id: i64,
    skill_id: i64,
    significance: Option<f64>,
    unique_postings: Option<i64>,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO job_skills (job_id, skill_id, significance, unique_postings)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(job_id, skill_id) DO UPDATE SET
            significance = excluded.significance,
            unique_postings = excluded.unique_postings,
            updated_at = CURRENT_TIMESTAMP
        WHERE job_skills.is_blacklisted = 0
        "#,
    )
    .bind(job_id)
    .bind(skill_id)
    .bind(significance)
    .bind(unique_postings)
    .execute(exec)
    .await?;

    Ok(())
}

pub async fn get_job<'e, E>(exec: E, id: i64) -> Result<Option<Job>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
    Ok(sqlx::query_as::<_, Job>(&sql).bind(id).fetch_optional(exec).await?)
}

pub async fn all_jobs<'e, E>(exec: E) -> Result<Vec<Job>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM jobs ORDER BY id", JOB_COLUMNS);
    Ok(sqlx::query_as::<_, Job>(&sql).fetch_all(exec).await?)
}

/// Jobs that have a display name
pub async fn named_jobs<'e, E>(exec: E) -> Result<Vec<Job>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM jobs WHERE name IS NOT NULL ORDER BY id", JOB_COLUMNS);
    Ok(sqlx::query_as::<_, Job>(&sql).fetch_all(exec).await?)
}

pub async fn jobs_missing_names<'e, E>(exec: E) -> Result<Vec<Job>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM jobs WHERE name IS NULL ORDER BY id", JOB_COLUMNS);
    Ok(sqlx::query_as::<_, Job>(&sql).fetch_all(exec).await?)
}

/// Set a job's name; a name held by another job is a unique violation
pub async fn set_job_name<'e, E>(exec: E, id: i64, name: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE jobs SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(exec)
        .await?;

    Ok(())
}

pub async fn list_jobs(pool: &SqlitePool, pagination: Pagination) -> Result<(Vec<Job>, i64)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs").fetch_one(pool).await?;

    let sql = format!("SELECT {} FROM jobs ORDER BY id LIMIT ? OFFSET ?", JOB_COLUMNS);
    let jobs = sqlx::query_as::<_, Job>(&sql)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

    Ok((jobs, count))
}

/// Skill attached to a job, with vendor statistics
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct JobSkillDetail {
    pub skill_id: i64,
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub info_url: Option<String>,
    pub type_id: Option<String>,
    pub type_name: Option<String>,
    pub significance: Option<f64>,
    pub unique_postings: Option<i64>,
}

/// Skills of one job, most significant first
pub async fn job_skills<'e, E>(
    exec: E,
    job_id: i64,
    filter: AssociationFilter,
) -> Result<Vec<JobSkillDetail>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT s.id AS skill_id, s.external_id, s.name, s.description, s.info_url, s.type_id, \
                s.type_name, js.significance, js.unique_postings \
         FROM job_skills js JOIN skills s ON s.id = js.skill_id \
         WHERE js.job_id = ? AND {} \
         ORDER BY js.significance IS NULL, js.significance DESC, s.name",
        filter.predicate("js")
    );
    Ok(sqlx::query_as::<_, JobSkillDetail>(&sql)
        .bind(job_id)
        .fetch_all(exec)
        .await?)
}

/// Categories returned per job
pub const TOP_CATEGORIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortSkill {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillSubcategoryGroup {
    pub name: String,
    pub skills: Vec<ShortSkill>,
}

/// A category of a job's skills with its subcategories
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillCategoryGroup {
    pub name: String,
    pub skills: Vec<ShortSkill>,
    pub skills_subcategories: Vec<SkillSubcategoryGroup>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CategorizedJobSkill {
    skill_id: i64,
    name: String,
    category: String,
    subcategory: Option<String>,
    significance: Option<f64>,
    unique_postings: Option<i64>,
}

/// Top categories of a job's whitelisted skills
///
/// Ranked by summed significance, then summed unique postings, then skill
/// count. Skills without a category are left out.
pub async fn job_top_skill_categories<'e, E>(exec: E, job_id: i64) -> Result<Vec<SkillCategoryGroup>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, CategorizedJobSkill>(
        "SELECT s.id AS skill_id, s.name, s.category, s.subcategory, js.significance, js.unique_postings \
         FROM job_skills js JOIN skills s ON s.id = js.skill_id \
         WHERE js.job_id = ? AND js.is_blacklisted = 0 AND s.category IS NOT NULL \
         ORDER BY s.name, s.id",
    )
    .bind(job_id)
    .fetch_all(exec)
    .await?;

    Ok(group_by_category(rows, TOP_CATEGORIES))
}

fn group_by_category(rows: Vec<CategorizedJobSkill>, limit: usize) -> Vec<SkillCategoryGroup> {
    struct Ranked {
        group: SkillCategoryGroup,
        significance: f64,
        unique_postings: i64,
    }

    let mut ranked: Vec<Ranked> = Vec::new();
    for row in rows {
        let index = match ranked.iter().position(|r| r.group.name == row.category) {
            Some(index) => index,
            None => {
                ranked.push(Ranked {
                    group: SkillCategoryGroup {
                        name: row.category.clone(),
                        skills: Vec::new(),
                        skills_subcategories: Vec::new(),
                    },
                    significance: 0.0,
                    unique_postings: 0,
                });
                ranked.len() - 1
            }
        };
        let entry = &mut ranked[index];
        entry.significance += row.significance.unwrap_or(0.0);
        entry.unique_postings += row.unique_postings.unwrap_or(0);

        let skill = ShortSkill {
            id: row.skill_id,
            name: row.name,
        };
        if let Some(subcategory) = row.subcategory {
            let subcategories = &mut entry.group.skills_subcategories;
            match subcategories.iter_mut().find(|s| s.name == subcategory) {
                Some(existing) => existing.skills.push(skill.clone()),
                None => subcategories.push(SkillSubcategoryGroup {
                    name: subcategory,
                    skills: vec![skill.clone()],
                }),
            }
        }
        entry.group.skills.push(skill);
    }

    ranked.sort_by(|a, b| {
        b.significance
            .total_cmp(&a.significance)
            .then(b.unique_postings.cmp(&a.unique_postings))
            .then(b.group.skills.len().cmp(&a.group.skills.len()))
    });
    ranked.into_iter().take(limit).map(|r| r.group).collect()
}

/// Map job external ids to row ids; unknown ids are absent from the map
pub async fn job_ids_by_external_id(
    conn: &mut SqliteConnection,
    external_ids: &[String],
) -> Result<HashMap<String, i64>> {
    if external_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT external_id, id FROM jobs WHERE external_id IN (");
    let mut separated = builder.separated(", ");
    for external_id in external_ids {
        separated.push_bind(external_id);
    }
    separated.push_unseparated(")");

    let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(conn).await?;
    Ok(rows.into_iter().collect())
}

pub async fn upsert_industry<'e, E>(exec: E, code: &str, name: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO industries (code, name) VALUES (?, ?)
        ON CONFLICT(code) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
    )
    .bind(code)
    .bind(name)
    .fetch_one(exec)
    .await?;

    Ok(id)
}

pub async fn link_job_industry<'e, E>(exec: E, job_id: i64, industry_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO job_industries (job_id, industry_id) VALUES (?, ?)
         ON CONFLICT(job_id, industry_id) DO NOTHING",
    )
    .bind(job_id)
    .bind(industry_id)
    .execute(exec)
    .await?;

    Ok(())
}

pub async fn industry_names_for_job<'e, E>(exec: E, job_id: i64) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar(
        "SELECT i.name FROM job_industries ji JOIN industries i ON i.id = ji.industry_id
         WHERE ji.job_id = ? ORDER BY i.name",
    )
    .bind(job_id)
    .fetch_all(exec)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::skills::{upsert_skill, SkillInput};
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

    #[tokio::test]
    async fn test_upsert_job_is_stable() {
        let pool = setup_test_db().await;
        let a = upsert_job(&pool, "ET1").await.unwrap();
        let b = upsert_job(&pool, "ET1").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(jobs_missing_names(&pool).await.unwrap().len(), 1);

        set_job_name(&pool, a, "Engineer").await.unwrap();
        assert!(jobs_missing_names(&pool).await.unwrap().is_empty());
        assert_eq!(named_jobs(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_job_name_is_unique_violation() {
        let pool = setup_test_db().await;
        let a = upsert_job(&pool, "ET1").await.unwrap();
        let b = upsert_job(&pool, "ET2").await.unwrap();
        set_job_name(&pool, a, "Engineer").await.unwrap();

        let err = set_job_name(&pool, b, "Engineer").await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_job_skills_ordering_and_blacklist() {
        let pool = setup_test_db().await;
        let job = upsert_job(&pool, "ET1").await.unwrap();
        let mut ids = Vec::new();
        for ext in ["KS1", "KS2", "KS3"] {
            let id = upsert_skill(
                &pool,
                &SkillInput {
                    external_id: ext.to_string(),
                    name: ext.to_string(),
                    description: String::new(),
                    info_url: None,
                    type_id: None,
                    type_name: None,
                },
            )
            .await
            .unwrap();
            ids.push(id);
        }
        upsert_job_skill(&pool, job, ids[0], Some(1.0), Some(10)).await.unwrap();
        upsert_job_skill(&pool, job, ids[1], Some(5.0), Some(20)).await.unwrap();
        upsert_job_skill(&pool, job, ids[2], None, None).await.unwrap();
        sqlx::query("UPDATE job_skills SET is_blacklisted = 1 WHERE skill_id = ?")
            .bind(ids[0])
            .execute(&pool)
            .await
            .unwrap();

        let skills = job_skills(&pool, job, AssociationFilter::Whitelisted).await.unwrap();
        let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["KS2", "KS3"]);
    }

    #[tokio::test]
    async fn test_industries() {
        let pool = setup_test_db().await;
        let job = upsert_job(&pool, "ET1").await.unwrap();
        let first = upsert_industry(&pool, "54", "Professional Services").await.unwrap();
        let again = upsert_industry(&pool, "54", "Professional, Scientific Services").await.unwrap();
        assert_eq!(first, again);

        link_job_industry(&pool, job, first).await.unwrap();
        link_job_industry(&pool, job, first).await.unwrap();
        assert_eq!(
            industry_names_for_job(&pool, job).await.unwrap(),
            vec!["Professional, Scientific Services".to_string()]
        );
    }

    #[tokio::test]
    async fn test_top_categories_ranked_and_grouped() {
        let pool = setup_test_db().await;
        let job = upsert_job(&pool, "ET1").await.unwrap();

        let skills = [
            ("KS1", "Rust", Some(("IT", Some("Languages"))), 5.0),
            ("KS2", "SQL", Some(("IT", Some("Databases"))), 4.0),
            ("KS3", "Go", Some(("IT", Some("Languages"))), 1.0),
            ("KS4", "Budgeting", Some(("Finance", None)), 2.0),
            ("KS5", "Mystery", None, 9.0),
        ];
        for (ext, name, category, significance) in skills {
            let id = upsert_skill(
                &pool,
                &SkillInput {
                    external_id: ext.to_string(),
                    name: name.to_string(),
                    description: String::new(),
                    info_url: None,
                    type_id: None,
                    type_name: None,
                },
            )
            .await
            .unwrap();
            if let Some((category, subcategory)) = category {
                crate::db::skills::update_skill_category(&pool, id, category, subcategory)
                    .await
                    .unwrap();
            }
            upsert_job_skill(&pool, job, id, Some(significance), Some(1)).await.unwrap();
        }

        let groups = job_top_skill_categories(&pool, job).await.unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["IT", "Finance"]);

        let it = &groups[0];
        assert_eq!(it.skills.len(), 3);
        assert_eq!(it.skills_subcategories.len(), 2);
        let languages = it
            .skills_subcategories
            .iter()
            .find(|s| s.name == "Languages")
            .unwrap();
        let language_names: Vec<&str> = languages.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(language_names, vec!["Go", "Rust"]);
        assert!(groups[1].skills_subcategories.is_empty());
    }
}
