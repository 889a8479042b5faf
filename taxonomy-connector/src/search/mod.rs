//! Job search indexing

pub mod algolia;
pub mod job_records;

pub use algolia::{AlgoliaClient, AlgoliaError};
pub use job_records::{build_job_records, job_recommendations, JobRecord};

use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Common(#[from] taxonomy_common::Error),

    #[error(transparent)]
    Algolia(#[from] AlgoliaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Settings applied to the jobs index before every reindex
pub fn jobs_index_settings() -> Value {
    json!({
        "attributeForDistinct": "external_id",
        "distinct": true,
        "typoTolerance": false,
        "searchableAttributes": [
            "unordered(name)",
            "skills.name",
        ],
        "attributesForFaceting": [
            "searchable(name)",
            "searchable(skills.name)",
            "searchable(industry_names)",
        ],
    })
}

/// Reset index settings and replace the index with every named job
pub async fn index_jobs_data(db: &Pool<Sqlite>, client: &AlgoliaClient) -> Result<usize, IndexError> {
    info!(index = %client.index_name(), "Resetting Algolia index settings");
    client.set_index_settings(&jobs_index_settings()).await?;

    let started = Instant::now();
    let records = build_job_records(db).await?;
    info!(
        jobs = records.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Job records built"
    );

    let objects = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    client.replace_all_objects(&objects).await?;

    info!(jobs = objects.len(), "Jobs indexed");
    Ok(objects.len())
}
