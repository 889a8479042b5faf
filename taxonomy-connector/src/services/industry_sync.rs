//! Industry sync from the content provider

use crate::db::jobs::{job_ids_by_external_id, link_job_industry, upsert_industry};
use crate::providers::ContentProvider;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use taxonomy_common::Result;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndustrySyncReport {
    pub industries: usize,
    pub links: usize,
    pub unknown_jobs: usize,
}

/// Upsert provider industries and link them to known jobs
pub async fn sync_industries(db: &Pool<Sqlite>, provider: &dyn ContentProvider) -> Result<IndustrySyncReport> {
    let industries = provider.industries().await?;
    let mut report = IndustrySyncReport::default();

    let mut tx = db.begin().await?;
    for industry in &industries {
        let industry_id = upsert_industry(&mut *tx, &industry.code, &industry.name).await?;
        report.industries += 1;

        let jobs = job_ids_by_external_id(&mut tx, &industry.job_external_ids).await?;
        for external_id in &industry.job_external_ids {
            match jobs.get(external_id) {
                Some(&job_id) => {
                    link_job_industry(&mut *tx, job_id, industry_id).await?;
                    report.links += 1;
                }
                None => {
                    warn!(industry = %industry.code, job = %external_id, "Unknown job in industry");
                    report.unknown_jobs += 1;
                }
            }
        }
    }
    tx.commit().await?;

    info!(
        industries = report.industries,
        links = report.links,
        unknown_jobs = report.unknown_jobs,
        "Industries synced"
    );
    Ok(report)
}
