//! Job, job-skill and job-posting refresh

use super::{tolerate, ServiceResult};
use crate::db::job_postings::{upsert_job_posting, JobPostingInput};
use crate::db::jobs::{
    all_jobs, job_ids_by_external_id, jobs_missing_names, set_job_name, upsert_job, upsert_job_skill,
};
use crate::db::skills::{skill_ids_by_external_id, whitelisted_skill_external_ids};
use crate::vendor::{RankingBucket, RankingFacet, VendorClient, MAX_IDS_PER_REQUEST};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSkillsReport {
    pub jobs: usize,
    pub job_skills: usize,
    /// Nested skills the store does not know
    pub unknown_skills: usize,
    /// Vendor requests that failed; their skills are left as they were
    pub failed_chunks: usize,
    pub names: JobNamesReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobNamesReport {
    pub named: usize,
    /// Names already held by another job
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobPostingsReport {
    pub updated: usize,
    pub unknown_jobs: usize,
    pub failed_chunks: usize,
}

pub struct JobRefresher {
    db: Pool<Sqlite>,
    vendor: Arc<VendorClient>,
}

impl JobRefresher {
    pub fn new(db: Pool<Sqlite>, vendor: Arc<VendorClient>) -> Self {
        Self { db, vendor }
    }

    /// Rank jobs for every whitelisted skill and store job-skill links
    ///
    /// Skill ids go to the vendor 100 at a time and each chunk commits on
    /// its own; a failed chunk is counted and the next one still runs.
    pub async fn refresh_job_skills(&self) -> ServiceResult<JobSkillsReport> {
        let mut report = JobSkillsReport::default();

        let skill_ids = whitelisted_skill_external_ids(&self.db).await?;
        if skill_ids.is_empty() {
            info!("No whitelisted skills, nothing to refresh");
            return Ok(report);
        }
        info!(skills = skill_ids.len(), "Refreshing job skills");

        for (index, chunk) in skill_ids.chunks(MAX_IDS_PER_REQUEST).enumerate() {
            let buckets = match self
                .vendor
                .get_jobs(RankingFacet::Title, RankingFacet::Skills, chunk)
                .await
            {
                Ok(buckets) => buckets,
                Err(e) => {
                    tolerate(e, &format!("jobs ranking chunk {}", index + 1))?;
                    report.failed_chunks += 1;
                    continue;
                }
            };
            self.store_job_skills(&buckets, &mut report).await?;
        }

        report.names = self.populate_job_names().await?;

        info!(
            jobs = report.jobs,
            job_skills = report.job_skills,
            unknown_skills = report.unknown_skills,
            failed_chunks = report.failed_chunks,
            "Job skill refresh complete"
        );
        Ok(report)
    }

    async fn store_job_skills(&self, buckets: &[RankingBucket], report: &mut JobSkillsReport) -> ServiceResult<()> {
        let nested_ids: Vec<String> = buckets
            .iter()
            .flat_map(|b| b.nested().iter().map(|n| n.name.clone()))
            .collect();

        let mut tx = self.db.begin().await?;
        let skill_map = skill_ids_by_external_id(&mut tx, &nested_ids).await?;

        for bucket in buckets {
            let job_id = upsert_job(&mut *tx, &bucket.name).await?;
            report.jobs += 1;

            for nested in bucket.nested() {
                match skill_map.get(&nested.name) {
                    Some(&skill_id) => {
                        upsert_job_skill(
                            &mut *tx,
                            job_id,
                            skill_id,
                            nested.significance(),
                            nested.unique_postings(),
                        )
                        .await?;
                        report.job_skills += 1;
                    }
                    None => {
                        warn!(job = %bucket.name, skill = %nested.name, "Skill not found, skipping job skill");
                        report.unknown_skills += 1;
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fill names of jobs that have none
    pub async fn populate_job_names(&self) -> ServiceResult<JobNamesReport> {
        let mut report = JobNamesReport::default();

        let jobs = jobs_missing_names(&self.db).await?;
        if jobs.is_empty() {
            return Ok(report);
        }

        let by_external: HashMap<String, i64> =
            jobs.iter().map(|j| (j.external_id.clone(), j.id)).collect();
        let ids: Vec<String> = by_external.keys().cloned().collect();

        let items = match self.vendor.get_details(RankingFacet::Title, &ids).await {
            Ok(items) => items,
            Err(e) => {
                tolerate(e, "job names lookup")?;
                return Ok(report);
            }
        };

        for item in items {
            let (Some(&job_id), Some(name)) = (by_external.get(&item.id), item.display_name()) else {
                continue;
            };
            match set_job_name(&self.db, job_id, &name).await {
                Ok(()) => report.named += 1,
                Err(e) if e.is_unique_violation() => {
                    warn!(job = %item.id, name = %name, "Job name already in use, skipping");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(named = report.named, conflicts = report.conflicts, "Job names populated");
        Ok(report)
    }

    /// Fetch posting statistics for every job, committing per 100-id chunk
    pub async fn refresh_job_postings(&self) -> ServiceResult<JobPostingsReport> {
        let mut report = JobPostingsReport::default();

        let jobs = all_jobs(&self.db).await?;
        if jobs.is_empty() {
            info!("No jobs, nothing to refresh");
            return Ok(report);
        }
        let ids: Vec<String> = jobs.iter().map(|j| j.external_id.clone()).collect();

        for (index, chunk) in ids.chunks(MAX_IDS_PER_REQUEST).enumerate() {
            let buckets = match self.vendor.get_job_postings(RankingFacet::Title, chunk).await {
                Ok(buckets) => buckets,
                Err(e) => {
                    tolerate(e, &format!("job postings chunk {}", index + 1))?;
                    report.failed_chunks += 1;
                    continue;
                }
            };

            let mut tx = self.db.begin().await?;
            let job_map = job_ids_by_external_id(&mut tx, chunk).await?;
            for bucket in &buckets {
                let Some(&job_id) = job_map.get(&bucket.name) else {
                    warn!(job = %bucket.name, "Posting data for unknown job, skipping");
                    report.unknown_jobs += 1;
                    continue;
                };
                upsert_job_posting(&mut *tx, job_id, &posting_input(bucket)).await?;
                report.updated += 1;
            }
            tx.commit().await?;
        }

        info!(
            updated = report.updated,
            unknown_jobs = report.unknown_jobs,
            failed_chunks = report.failed_chunks,
            "Job postings refresh complete"
        );
        Ok(report)
    }
}

fn posting_input(bucket: &RankingBucket) -> JobPostingInput {
    JobPostingInput {
        median_salary: bucket.median_salary(),
        median_posting_duration: bucket.median_posting_duration(),
        unique_postings: bucket.unique_postings(),
        unique_companies: bucket.unique_companies(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_posting_input_tolerates_bad_values() {
        let bucket: RankingBucket = serde_json::from_value(json!({
            "name": "ET1",
            "median_salary": "$45000.34",
            "median_posting_duration": "n/a",
            "unique_postings": 12,
        }))
        .unwrap();

        let input = posting_input(&bucket);
        assert_eq!(input.median_salary, Some(45000.34));
        assert_eq!(input.median_posting_duration, None);
        assert_eq!(input.unique_postings, Some(12));
        assert_eq!(input.unique_companies, None);
    }
}
