//! Skill category backfill

use super::{tolerate, ServiceResult};
use crate::db::skills::{skills_missing_details, update_skill_category};
use crate::vendor::VendorClient;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

const DETAILS_CHUNK: i64 = 100;

/// Fill category/subcategory of skills lacking them; returns skills updated
///
/// Stored values are never cleared by an empty vendor answer.
pub async fn fetch_skill_details(db: &Pool<Sqlite>, vendor: &VendorClient) -> ServiceResult<usize> {
    let mut updated = 0;
    let mut failed = 0;
    let mut after_id = 0;

    loop {
        let skills = skills_missing_details(db, after_id, DETAILS_CHUNK).await?;
        let Some(last) = skills.last() else {
            break;
        };
        after_id = last.id;

        for skill in &skills {
            match vendor.get_skill_details(&skill.external_id).await {
                Ok(details) => {
                    let (Some(category), subcategory) = details.category_names() else {
                        debug!(skill = %skill.external_id, "No category in skill details");
                        continue;
                    };
                    update_skill_category(db, skill.id, &category, subcategory.as_deref()).await?;
                    updated += 1;
                }
                Err(e) => {
                    tolerate(e, &skill.external_id)?;
                    failed += 1;
                }
            }
        }
    }

    info!(updated, failed, "Skill details fetched");
    Ok(updated)
}
