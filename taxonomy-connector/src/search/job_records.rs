//! Search records for jobs
//!
//! One record per named job, carrying its top skills, posting statistics,
//! industries and the three most similar jobs by skill overlap.

use crate::db::job_postings::job_posting_for_job;
use crate::db::jobs::{industry_names_for_job, job_skills, named_jobs, JobSkillDetail};
use crate::db::AssociationFilter;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::{HashMap, HashSet};
use taxonomy_common::db::{Job, JobPosting};
use taxonomy_common::Result;

/// Cap on embedded lists (skills) per record
pub const EMBEDDED_OBJECT_LENGTH_CAP: usize = 20;

pub const SIMILAR_JOBS_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillRecord {
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub info_url: Option<String>,
    pub type_id: Option<String>,
    pub type_name: Option<String>,
    pub significance: Option<f64>,
    pub unique_postings: Option<i64>,
}

impl From<JobSkillDetail> for SkillRecord {
    fn from(detail: JobSkillDetail) -> Self {
        Self {
            external_id: detail.external_id,
            name: detail.name,
            description: detail.description,
            info_url: detail.info_url,
            type_id: detail.type_id,
            type_name: detail.type_name,
            significance: detail.significance,
            unique_postings: detail.unique_postings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPostingRecord {
    pub job_id: i64,
    pub median_salary: Option<f64>,
    pub median_posting_duration: Option<i64>,
    pub unique_postings: Option<i64>,
    pub unique_companies: Option<i64>,
}

impl From<JobPosting> for JobPostingRecord {
    fn from(posting: JobPosting) -> Self {
        Self {
            job_id: posting.job_id,
            median_salary: posting.median_salary,
            median_posting_duration: posting.median_posting_duration,
            unique_postings: posting.unique_postings,
            unique_companies: posting.unique_companies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub skills: Vec<SkillRecord>,
    pub job_postings: Vec<JobPostingRecord>,
    pub industry_names: Vec<String>,
    pub similar_jobs: Vec<String>,
    #[serde(rename = "objectID")]
    pub object_id: String,
}

/// |A ∩ B| / |A ∪ B|, zero when both sets are empty
pub fn jaccard_similarity(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Names of the most similar jobs for every job name
///
/// `jobs` pairs a job name with its skill names. Ties keep the order in
/// which candidates appear in `jobs`.
pub fn job_recommendations(jobs: &[(String, Vec<String>)]) -> HashMap<String, Vec<String>> {
    let skill_sets: Vec<HashSet<&str>> = jobs
        .iter()
        .map(|(_, skills)| skills.iter().map(String::as_str).collect())
        .collect();

    let mut recommendations = HashMap::new();
    for (i, (name, _)) in jobs.iter().enumerate() {
        let mut scored: Vec<(f64, &str)> = jobs
            .iter()
            .enumerate()
            .filter(|(_, (other, _))| other != name)
            .map(|(j, (other, _))| (jaccard_similarity(&skill_sets[i], &skill_sets[j]), other.as_str()))
            .collect();
        // Stable sort keeps first-occurrence order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let similar = scored
            .into_iter()
            .take(SIMILAR_JOBS_COUNT)
            .map(|(_, other)| other.to_string())
            .collect();
        recommendations.insert(name.clone(), similar);
    }
    recommendations
}

struct JobData {
    job: Job,
    name: String,
    skills: Vec<JobSkillDetail>,
}

/// Build a record for every named job
pub async fn build_job_records(db: &Pool<Sqlite>) -> Result<Vec<JobRecord>> {
    let mut jobs = Vec::new();
    for job in named_jobs(db).await? {
        let Some(name) = job.name.clone() else {
            continue;
        };
        let skills = job_skills(db, job.id, AssociationFilter::Whitelisted).await?;
        jobs.push(JobData { job, name, skills });
    }

    let skill_names: Vec<(String, Vec<String>)> = jobs
        .iter()
        .map(|data| {
            let names = data.skills.iter().map(|s| s.name.clone()).collect();
            (data.name.clone(), names)
        })
        .collect();
    let mut recommendations = job_recommendations(&skill_names);
    tracing::debug!(jobs = jobs.len(), "Job recommendations calculated");

    let mut records = Vec::with_capacity(jobs.len());
    for data in jobs {
        let posting = job_posting_for_job(db, data.job.id).await?;
        let industry_names = industry_names_for_job(db, data.job.id).await?;
        let similar_jobs = recommendations.remove(&data.name).unwrap_or_default();

        records.push(JobRecord {
            id: data.job.id,
            object_id: format!("job-{}", data.job.external_id),
            external_id: data.job.external_id,
            name: data.name,
            description: data.job.description,
            skills: data
                .skills
                .into_iter()
                .take(EMBEDDED_OBJECT_LENGTH_CAP)
                .map(SkillRecord::from)
                .collect(),
            job_postings: posting.into_iter().map(JobPostingRecord::from).collect(),
            industry_names,
            similar_jobs,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<'a>(items: &[&'a str]) -> HashSet<&'a str> {
        items.iter().copied().collect()
    }

    fn job(name: &str, skills: &[&str]) -> (String, Vec<String>) {
        (name.to_string(), skills.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard_similarity(&set(&["a"]), &set(&["a"])), 1.0);
        assert_eq!(jaccard_similarity(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_recommendations_pick_top_three() {
        let jobs = vec![
            job("Engineer", &["rust", "sql", "git"]),
            job("Developer", &["rust", "sql", "git"]),
            job("Analyst", &["sql", "excel"]),
            job("Designer", &["figma"]),
            job("Admin", &["git", "linux"]),
        ];
        let recs = job_recommendations(&jobs);

        let engineer = &recs["Engineer"];
        assert_eq!(engineer.len(), 3);
        assert_eq!(engineer[0], "Developer");
        assert!(!engineer.contains(&"Engineer".to_string()));
        assert!(!engineer.contains(&"Designer".to_string()));
    }

    #[test]
    fn test_ties_keep_first_occurrence() {
        let jobs = vec![
            job("A", &[]),
            job("B", &[]),
            job("C", &[]),
            job("D", &[]),
            job("E", &[]),
        ];
        let recs = job_recommendations(&jobs);
        assert_eq!(recs["A"], vec!["B", "C", "D"]);
        assert_eq!(recs["C"], vec!["A", "B", "D"]);
    }
}
