//! Host content providers
//!
//! The connector never reads the host platform directly. Courses, programs,
//! xblocks and course runs come through a [`ContentProvider`]; the shipped
//! implementation reads a JSON catalog file.

pub mod catalog;

pub use catalog::{Catalog, JsonCatalogProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taxonomy_common::db::ProductType;
use taxonomy_common::Result;

/// Content item ready for skill extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductContent {
    /// Course key, program uuid or xblock usage key
    pub key: String,
    /// Owning course, set for xblocks
    pub course_key: Option<String>,
    /// Text sent to the vendor; empty means nothing to tag
    pub text: String,
}

/// A published course run whose xblocks can be tagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRunContent {
    pub course_run_key: String,
    #[serde(default)]
    pub course_key: String,
}

/// Industry grouping of jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryContent {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub job_external_ids: Vec<String>,
}

/// Source of host content metadata
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Keys of every taggable item of `product_type`
    async fn product_keys(&self, product_type: ProductType) -> Result<Vec<String>>;

    /// Content for the given keys; unknown keys are omitted
    async fn get_products(
        &self,
        product_type: ProductType,
        keys: &[String],
    ) -> Result<Vec<ProductContent>>;

    /// All xblocks under a course run
    async fn get_all_xblocks_in_course(&self, course_run_key: &str) -> Result<Vec<ProductContent>>;

    async fn get_all_published_course_runs(&self) -> Result<Vec<CourseRunContent>>;

    async fn industries(&self) -> Result<Vec<IndustryContent>> {
        Ok(Vec::new())
    }
}

/// Course key owning an xblock usage key
///
/// `block-v1:edX+DemoX+2024+type@html+block@intro` → `course-v1:edX+DemoX+2024`
pub fn derive_course_key(usage_key: &str) -> Option<String> {
    let locator = usage_key.strip_prefix("block-v1:")?;
    let course_part = locator.split("+type@").next()?;
    if course_part.is_empty() || course_part == locator {
        return None;
    }
    Some(format!("course-v1:{}", course_part))
}
