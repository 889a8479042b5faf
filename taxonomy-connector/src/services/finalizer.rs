//! XBlock skill tag finalization
//!
//! Open (unverified, not blacklisted) rows with at least `min_votes` votes
//! become verified when `verified_count / total >= ratio_threshold`, and
//! blacklisted otherwise. Rows are scanned by id in chunks, one
//! transaction per chunk.

use crate::config::VerificationThresholds;
use crate::db::xblocks::{fetch_finalization_candidates, mark_blacklisted, mark_verified};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use taxonomy_common::db::XBlockSkillData;
use taxonomy_common::Result;
use tracing::{debug, info};

pub const DEFAULT_FINALIZE_CHUNK: i64 = 500;

/// Outcome of one finalization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub examined: usize,
    pub verified: usize,
    pub blacklisted: usize,
}

/// Decision for one row with enough votes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Blacklisted,
}

/// `None` while the row has fewer than `min_votes` votes
pub fn verdict(row: &XBlockSkillData, thresholds: &VerificationThresholds) -> Option<Verdict> {
    let total = row.total_votes();
    if total < thresholds.min_votes || total == 0 {
        return None;
    }
    let ratio = row.verified_count as f64 / total as f64;
    if ratio >= thresholds.ratio_threshold {
        Some(Verdict::Verified)
    } else {
        Some(Verdict::Blacklisted)
    }
}

pub struct XBlockSkillFinalizer {
    db: Pool<Sqlite>,
    thresholds: VerificationThresholds,
    chunk_size: i64,
}

impl XBlockSkillFinalizer {
    pub fn new(db: Pool<Sqlite>, thresholds: VerificationThresholds) -> Self {
        Self {
            db,
            thresholds,
            chunk_size: DEFAULT_FINALIZE_CHUNK,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn finalize(&self) -> Result<FinalizeReport> {
        info!(
            min_votes = self.thresholds.min_votes,
            ratio_threshold = self.thresholds.ratio_threshold,
            "Finalizing xblock skill tags"
        );

        let mut report = FinalizeReport::default();
        let mut after_id = 0;

        loop {
            let mut tx = self.db.begin().await?;
            let rows = fetch_finalization_candidates(
                &mut *tx,
                after_id,
                self.thresholds.min_votes,
                self.chunk_size,
            )
            .await?;
            let Some(last) = rows.last() else {
                tx.commit().await?;
                break;
            };
            after_id = last.id;

            for row in &rows {
                report.examined += 1;
                match verdict(row, &self.thresholds) {
                    Some(Verdict::Verified) => {
                        if mark_verified(&mut *tx, row.id).await? {
                            report.verified += 1;
                        }
                    }
                    Some(Verdict::Blacklisted) => {
                        if mark_blacklisted(&mut *tx, row.id).await? {
                            report.blacklisted += 1;
                        }
                    }
                    None => {}
                }
            }
            tx.commit().await?;
            debug!(after_id, rows = rows.len(), "Finalization chunk committed");
        }

        info!(
            examined = report.examined,
            verified = report.verified,
            blacklisted = report.blacklisted,
            "Finalization complete"
        );
        Ok(report)
    }
}
