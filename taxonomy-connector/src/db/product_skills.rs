//! Course and program skill associations
//!
//! Both tables share a shape; the content key column differs
//! (`course_key` vs `program_uuid`). XBlock associations live in
//! [`super::xblocks`] because they carry vote counters.

use super::AssociationFilter;
use sqlx::{Executor, Sqlite};
use taxonomy_common::db::{ProductSkill, ProductType};
use taxonomy_common::{Error, Result};

fn key_column(product_type: ProductType) -> Result<&'static str> {
    match product_type {
        ProductType::Course => Ok("course_key"),
        ProductType::Program => Ok("program_uuid"),
        ProductType::XBlock => Err(Error::InvalidInput(
            "xblock associations are stored with vote data".to_string(),
        )),
    }
}

/// Insert or refresh a course/program association
///
/// A blacklisted pair keeps its flag and its old confidence.
pub async fn upsert_product_skill<'e, E>(
    exec: E,
    product_type: ProductType,
    product_key: &str,
    skill_id: i64,
    confidence: f64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let table = product_type.table();
    let column = key_column(product_type)?;
    let sql = format!(
        "INSERT INTO {table} ({column}, skill_id, confidence) VALUES (?, ?, ?) \
         ON CONFLICT({column}, skill_id) DO UPDATE SET \
             confidence = excluded.confidence, \
             updated_at = CURRENT_TIMESTAMP \
         WHERE {table}.is_blacklisted = 0",
    );

    sqlx::query(&sql)
        .bind(product_key)
        .bind(skill_id)
        .bind(confidence)
        .execute(exec)
        .await?;

    Ok(())
}

/// Associations of one content item, ordered by confidence
pub async fn list_product_skills<'e, E>(
    exec: E,
    product_type: ProductType,
    product_key: &str,
    filter: AssociationFilter,
) -> Result<Vec<ProductSkill>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let table = product_type.table();
    let column = key_column(product_type)?;
    let sql = format!(
        "SELECT p.id, p.{column} AS product_key, p.skill_id, p.confidence, p.is_blacklisted \
         FROM {table} p WHERE p.{column} = ? AND {} \
         ORDER BY p.confidence DESC, p.id",
        filter.predicate("p"),
    );

    Ok(sqlx::query_as::<_, ProductSkill>(&sql)
        .bind(product_key)
        .fetch_all(exec)
        .await?)
}

/// Soft-delete or restore an association
pub async fn set_product_skill_blacklisted<'e, E>(
    exec: E,
    product_type: ProductType,
    product_key: &str,
    skill_id: i64,
    blacklisted: bool,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let table = product_type.table();
    let column = key_column(product_type)?;
    let sql = format!(
        "UPDATE {table} SET is_blacklisted = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE {column} = ? AND skill_id = ?"
    );

    let result = sqlx::query(&sql)
        .bind(blacklisted)
        .bind(product_key)
        .bind(skill_id)
        .execute(exec)
        .await?;

    Ok(result.rows_affected() > 0)
}
