//! JSON catalog content provider
//!
//! Catalog layout:
//!
//! ```json
//! {
//!   "courses":     [{"key": "...", "title": "...", "short_description": "...", "full_description": "..."}],
//!   "programs":    [{"uuid": "...", "title": "...", "subtitle": "...", "overview": "..."}],
//!   "course_runs": [{"course_run_key": "...", "course_key": "...", "published": true}],
//!   "xblocks":     [{"usage_key": "...", "content_type": "html", "content": "..."}],
//!   "industries":  [{"code": "...", "name": "...", "job_external_ids": ["..."]}]
//! }
//! ```

use super::{derive_course_key, ContentProvider, CourseRunContent, IndustryContent, ProductContent};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use taxonomy_common::db::ProductType;
use taxonomy_common::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogCourse {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub full_description: String,
}

impl CatalogCourse {
    fn text(&self) -> String {
        join_non_empty(&[&self.short_description, &self.full_description])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogProgram {
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub overview: String,
}

impl CatalogProgram {
    fn text(&self) -> String {
        join_non_empty(&[&self.subtitle, &self.overview])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogCourseRun {
    pub course_run_key: String,
    #[serde(default)]
    pub course_key: String,
    #[serde(default = "default_true")]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogXBlock {
    pub usage_key: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

impl CatalogXBlock {
    fn to_content(&self) -> ProductContent {
        ProductContent {
            key: self.usage_key.clone(),
            course_key: derive_course_key(&self.usage_key),
            text: self.content.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub courses: Vec<CatalogCourse>,
    #[serde(default)]
    pub programs: Vec<CatalogProgram>,
    #[serde(default)]
    pub course_runs: Vec<CatalogCourseRun>,
    #[serde(default)]
    pub xblocks: Vec<CatalogXBlock>,
    #[serde(default)]
    pub industries: Vec<IndustryContent>,
}

fn default_true() -> bool {
    true
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content provider backed by an in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct JsonCatalogProvider {
    catalog: Catalog,
}

impl JsonCatalogProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Load a catalog JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Parse catalog failed ({}): {}", path.display(), e))
        })?;
        tracing::info!(
            courses = catalog.courses.len(),
            programs = catalog.programs.len(),
            xblocks = catalog.xblocks.len(),
            "Loaded content catalog from {}",
            path.display()
        );
        Ok(Self::new(catalog))
    }
}

#[async_trait]
impl ContentProvider for JsonCatalogProvider {
    async fn product_keys(&self, product_type: ProductType) -> Result<Vec<String>> {
        let keys = match product_type {
            ProductType::Course => self.catalog.courses.iter().map(|c| c.key.clone()).collect(),
            ProductType::Program => self.catalog.programs.iter().map(|p| p.uuid.clone()).collect(),
            ProductType::XBlock => self
                .catalog
                .xblocks
                .iter()
                .map(|x| x.usage_key.clone())
                .collect(),
        };
        Ok(keys)
    }

    async fn get_products(
        &self,
        product_type: ProductType,
        keys: &[String],
    ) -> Result<Vec<ProductContent>> {
        let wanted = |k: &String| keys.contains(k);

        let products = match product_type {
            ProductType::Course => self
                .catalog
                .courses
                .iter()
                .filter(|c| wanted(&c.key))
                .map(|c| ProductContent {
                    key: c.key.clone(),
                    course_key: None,
                    text: c.text(),
                })
                .collect(),
            ProductType::Program => self
                .catalog
                .programs
                .iter()
                .filter(|p| wanted(&p.uuid))
                .map(|p| ProductContent {
                    key: p.uuid.clone(),
                    course_key: None,
                    text: p.text(),
                })
                .collect(),
            ProductType::XBlock => self
                .catalog
                .xblocks
                .iter()
                .filter(|x| wanted(&x.usage_key))
                .map(CatalogXBlock::to_content)
                .collect(),
        };
        Ok(products)
    }

    async fn get_all_xblocks_in_course(&self, course_run_key: &str) -> Result<Vec<ProductContent>> {
        Ok(self
            .catalog
            .xblocks
            .iter()
            .map(CatalogXBlock::to_content)
            .filter(|x| x.course_key.as_deref() == Some(course_run_key))
            .collect())
    }

    async fn get_all_published_course_runs(&self) -> Result<Vec<CourseRunContent>> {
        Ok(self
            .catalog
            .course_runs
            .iter()
            .filter(|r| r.published)
            .map(|r| CourseRunContent {
                course_run_key: r.course_run_key.clone(),
                course_key: r.course_key.clone(),
            })
            .collect())
    }

    async fn industries(&self) -> Result<Vec<IndustryContent>> {
        Ok(self.catalog.industries.clone())
    }
}
