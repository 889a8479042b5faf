//! XBlock skill tagging
//!
//! Each tagged xblock stores a sha256 hash of its text. Unchanged,
//! already-processed xblocks are skipped, and an xblock whose text matches
//! another processed xblock reuses that xblock's skills instead of calling
//! the vendor again.

use super::skill_refresh::{persist_skill, DEFAULT_CHUNK_SIZE};
use super::{tolerate, RefreshSummary, ServiceResult};
use crate::db::xblocks::{
    copy_xblock_skills, find_processed_xblock_with_hash, get_xblock, is_course_run_processed,
    mark_course_run_processed, upsert_xblock, upsert_xblock_skill,
};
use crate::providers::{ContentProvider, ProductContent};
use crate::vendor::{ProductSkills, VendorClient};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use taxonomy_common::db::ProductType;
use taxonomy_common::Error;
use tracing::{debug, info, warn};

/// Default share of tagged xblocks needed to mark a course run complete
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 1.0;

/// Hex sha256 of xblock text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// What a refresh run covers
#[derive(Debug, Clone, PartialEq)]
pub enum XBlockTarget {
    /// Every xblock under the given course runs
    CourseRuns(Vec<String>),
    /// Specific usage keys
    XBlocks(Vec<String>),
    /// Every published course run; `limit` caps the runs processed
    All { limit: Option<usize> },
}

/// Counts of an xblock refresh run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XBlockRefreshReport {
    pub summary: RefreshSummary,
    pub course_runs_processed: usize,
    pub course_runs_completed: usize,
}

enum Pending {
    Tag {
        content: ProductContent,
        hash: String,
        skills: ProductSkills,
    },
    Reuse {
        content: ProductContent,
        hash: String,
        source_id: i64,
    },
}

pub struct XBlockRefresher {
    db: Pool<Sqlite>,
    vendor: Arc<VendorClient>,
    provider: Arc<dyn ContentProvider>,
    chunk_size: usize,
    commit: bool,
    success_threshold: f64,
}

impl XBlockRefresher {
    pub fn new(db: Pool<Sqlite>, vendor: Arc<VendorClient>, provider: Arc<dyn ContentProvider>) -> Self {
        Self {
            db,
            vendor,
            provider,
            chunk_size: DEFAULT_CHUNK_SIZE,
            commit: true,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub async fn refresh(&self, target: XBlockTarget) -> ServiceResult<XBlockRefreshReport> {
        let mut report = XBlockRefreshReport::default();

        match target {
            XBlockTarget::XBlocks(usage_keys) => {
                let xblocks = self.provider.get_products(ProductType::XBlock, &usage_keys).await?;
                if xblocks.is_empty() {
                    return Err(Error::NotFound(format!(
                        "No xblock metadata was found for xblocks {:?}",
                        usage_keys
                    ))
                    .into());
                }
                info!(xblocks = xblocks.len(), "Refreshing xblock skills");
                report.summary = self.tag_xblocks(&xblocks).await?;
            }
            XBlockTarget::CourseRuns(keys) => {
                self.refresh_course_runs(keys, None, &mut report).await?;
            }
            XBlockTarget::All { limit } => {
                let runs = self.provider.get_all_published_course_runs().await?;
                let keys = runs.into_iter().map(|r| r.course_run_key).collect();
                self.refresh_course_runs(keys, limit, &mut report).await?;
            }
        }

        info!(
            success = report.summary.success,
            skipped = report.summary.skipped,
            failure = report.summary.failure,
            course_runs_processed = report.course_runs_processed,
            course_runs_completed = report.course_runs_completed,
            "XBlock skill refresh complete"
        );

        Ok(report)
    }

    async fn refresh_course_runs(
        &self,
        course_run_keys: Vec<String>,
        limit: Option<usize>,
        report: &mut XBlockRefreshReport,
    ) -> ServiceResult<()> {
        for course_run_key in course_run_keys {
            if is_course_run_processed(&self.db, &course_run_key).await? {
                debug!(course_run = %course_run_key, "Course run already tagged");
                continue;
            }

            info!(course_run = %course_run_key, "Tagging xblocks in course run");
            let xblocks = self.provider.get_all_xblocks_in_course(&course_run_key).await?;
            let summary = self.tag_xblocks(&xblocks).await?;
            report.summary.absorb(summary);
            report.course_runs_processed += 1;

            if self.commit && self.is_complete(&summary) {
                info!(course_run = %course_run_key, "Marking course run as completely tagged");
                mark_course_run_processed(&self.db, &course_run_key).await?;
                report.course_runs_completed += 1;
            }

            if limit.is_some_and(|limit| limit > 0 && report.course_runs_processed >= limit) {
                info!(processed = report.course_runs_processed, "Course run limit reached");
                break;
            }
        }
        Ok(())
    }

    /// A run with nothing tagged or failed counts as complete
    fn is_complete(&self, summary: &RefreshSummary) -> bool {
        let total = summary.success + summary.failure;
        if total == 0 {
            return true;
        }
        summary.success as f64 / total as f64 >= self.success_threshold
    }

    async fn tag_xblocks(&self, xblocks: &[ProductContent]) -> ServiceResult<RefreshSummary> {
        let mut summary = RefreshSummary::default();
        for chunk in xblocks.chunks(self.chunk_size) {
            summary.absorb(self.tag_chunk(chunk).await?);
        }
        Ok(summary)
    }

    async fn tag_chunk(&self, xblocks: &[ProductContent]) -> ServiceResult<RefreshSummary> {
        let mut summary = RefreshSummary::default();
        let mut pending = Vec::new();

        for content in xblocks {
            if content.text.is_empty() {
                debug!(usage_key = %content.key, "XBlock has no text");
                summary.skipped += 1;
                continue;
            }

            let hash = content_hash(&content.text);
            if let Some(existing) = get_xblock(&self.db, &content.key).await? {
                if existing.auto_processed && existing.hash_content.as_deref() == Some(hash.as_str()) {
                    debug!(usage_key = %content.key, "XBlock content unchanged");
                    summary.skipped += 1;
                    continue;
                }
            }

            if let Some(twin) = find_processed_xblock_with_hash(&self.db, &hash, &content.key).await? {
                debug!(usage_key = %content.key, source = %twin.usage_key, "Reusing skills of identical xblock");
                summary.success += 1;
                pending.push(Pending::Reuse {
                    content: content.clone(),
                    hash,
                    source_id: twin.id,
                });
                continue;
            }

            match self.vendor.get_product_skills(&content.text).await {
                Ok(skills) => {
                    for problem in &skills.malformed {
                        warn!(usage_key = %content.key, problem = %problem, "Malformed skill record skipped");
                    }
                    summary.malformed += skills.malformed.len();
                    summary.success += 1;
                    pending.push(Pending::Tag {
                        content: content.clone(),
                        hash,
                        skills,
                    });
                }
                Err(e) => {
                    tolerate(e, &content.key)?;
                    summary.failure += 1;
                }
            }
        }

        if self.commit && !pending.is_empty() {
            let mut tx = self.db.begin().await?;
            for item in &pending {
                match item {
                    Pending::Tag { content, hash, skills } => {
                        let xblock_id =
                            upsert_xblock(&mut *tx, &content.key, content.course_key.as_deref(), hash).await?;
                        for extracted in &skills.skills {
                            let skill_id = persist_skill(&mut tx, extracted).await?;
                            upsert_xblock_skill(&mut *tx, xblock_id, skill_id).await?;
                        }
                    }
                    Pending::Reuse { content, hash, source_id } => {
                        let xblock_id =
                            upsert_xblock(&mut *tx, &content.key, content.course_key.as_deref(), hash).await?;
                        copy_xblock_skills(&mut tx, *source_id, xblock_id).await?;
                    }
                }
            }
            tx.commit().await?;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("Intro to Rust");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("Intro to Rust"));
        assert_ne!(a, content_hash("Intro to Go"));
    }
}
