//! Course and program skill refresh
//!
//! Keys are processed in chunks: one provider call per chunk, one vendor
//! call per item with text, and one transaction for the chunk's upserts.
//! Per-item vendor failures are logged and counted; credential and token
//! failures abort the run.

use super::{tolerate, RefreshSummary, ServiceResult};
use crate::db::product_skills::upsert_product_skill;
use crate::db::skills::{upsert_skill, SkillInput};
use crate::providers::ContentProvider;
use crate::vendor::{ExtractedSkill, ProductSkills, VendorClient};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::sync::Arc;
use taxonomy_common::db::ProductType;
use taxonomy_common::Result;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 50;

impl From<&ExtractedSkill> for SkillInput {
    fn from(extracted: &ExtractedSkill) -> Self {
        let skill_type = extracted.skill.skill_type.as_ref();
        Self {
            external_id: extracted.skill.id.clone(),
            name: extracted.skill.name.clone(),
            description: extracted.description.clone(),
            info_url: extracted.skill.info_url.clone(),
            type_id: skill_type.map(|t| t.id.clone()),
            type_name: skill_type.map(|t| t.name.clone()),
        }
    }
}

/// Upsert an extracted skill, returning its row id
pub(crate) async fn persist_skill(conn: &mut SqliteConnection, extracted: &ExtractedSkill) -> Result<i64> {
    upsert_skill(conn, &SkillInput::from(extracted)).await
}

/// Refreshes course/program skill associations from the vendor
pub struct SkillRefresher {
    db: Pool<Sqlite>,
    vendor: Arc<VendorClient>,
    provider: Arc<dyn ContentProvider>,
    chunk_size: usize,
    commit: bool,
}

impl SkillRefresher {
    pub fn new(db: Pool<Sqlite>, vendor: Arc<VendorClient>, provider: Arc<dyn ContentProvider>) -> Self {
        Self {
            db,
            vendor,
            provider,
            chunk_size: DEFAULT_CHUNK_SIZE,
            commit: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Without commit, vendor calls are made and counted but nothing is written
    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    /// Refresh `keys`, or every item the provider knows when `None`
    pub async fn refresh(
        &self,
        product_type: ProductType,
        keys: Option<Vec<String>>,
    ) -> ServiceResult<RefreshSummary> {
        let keys = match keys {
            Some(keys) => keys,
            None => self.provider.product_keys(product_type).await?,
        };

        info!(
            product_type = %product_type,
            items = keys.len(),
            chunk_size = self.chunk_size,
            commit = self.commit,
            "Refreshing product skills"
        );

        let mut summary = RefreshSummary::default();
        for (index, chunk) in keys.chunks(self.chunk_size).enumerate() {
            let chunk_summary = self.refresh_chunk(product_type, chunk).await?;
            debug!(chunk = index, ?chunk_summary, "Chunk processed");
            summary.absorb(chunk_summary);
        }

        info!(
            product_type = %product_type,
            success = summary.success,
            skipped = summary.skipped,
            failure = summary.failure,
            malformed = summary.malformed,
            "Product skill refresh complete"
        );

        Ok(summary)
    }

    async fn refresh_chunk(
        &self,
        product_type: ProductType,
        keys: &[String],
    ) -> ServiceResult<RefreshSummary> {
        let products = self.provider.get_products(product_type, keys).await?;
        let mut summary = RefreshSummary {
            skipped: keys.len().saturating_sub(products.len()),
            ..Default::default()
        };

        let mut tagged: Vec<(String, ProductSkills)> = Vec::new();
        for product in products {
            if product.text.is_empty() {
                debug!(key = %product.key, "No text to tag");
                summary.skipped += 1;
                continue;
            }

            match self.vendor.get_product_skills(&product.text).await {
                Ok(skills) => {
                    for problem in &skills.malformed {
                        tracing::warn!(key = %product.key, problem = %problem, "Malformed skill record skipped");
                    }
                    summary.malformed += skills.malformed.len();
                    summary.success += 1;
                    tagged.push((product.key, skills));
                }
                Err(e) => {
                    tolerate(e, &product.key)?;
                    summary.failure += 1;
                }
            }
        }

        if self.commit && !tagged.is_empty() {
            let mut tx = self.db.begin().await?;
            for (key, skills) in &tagged {
                for extracted in &skills.skills {
                    let skill_id = persist_skill(&mut tx, extracted).await?;
                    upsert_product_skill(&mut *tx, product_type, key, skill_id, extracted.confidence)
                        .await?;
                }
            }
            tx.commit().await?;
        }

        Ok(summary)
    }
}
