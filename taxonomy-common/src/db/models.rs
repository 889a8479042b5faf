//! Database models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Taxonomy skill, identified by its vendor id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Skill {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub info_url: Option<String>,
    pub type_id: Option<String>,
    pub type_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Industry {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobSkill {
    pub id: i64,
    pub job_id: i64,
    pub skill_id: i64,
    pub significance: Option<f64>,
    pub unique_postings: Option<i64>,
    pub is_blacklisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobPosting {
    pub id: i64,
    pub job_id: i64,
    pub median_salary: Option<f64>,
    pub median_posting_duration: Option<i64>,
    pub unique_postings: Option<i64>,
    pub unique_companies: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Course or program association with a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductSkill {
    pub id: i64,
    /// Course key or program uuid
    pub product_key: String,
    pub skill_id: i64,
    pub confidence: f64,
    pub is_blacklisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct XBlockSkills {
    pub id: i64,
    pub usage_key: String,
    pub course_key: Option<String>,
    pub requires_verification: bool,
    pub auto_processed: bool,
    pub hash_content: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct XBlockSkillData {
    pub id: i64,
    pub xblock_id: i64,
    pub skill_id: i64,
    pub verified_count: i64,
    pub ignored_count: i64,
    pub verified: bool,
    pub is_blacklisted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl XBlockSkillData {
    /// Votes cast on this association so far
    pub fn total_votes(&self) -> i64 {
        self.verified_count + self.ignored_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SkillsQuiz {
    pub id: i64,
    pub username: String,
    pub current_job_id: Option<i64>,
    pub created_at: String,
}

/// Kind of host content that can be tagged with skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Course,
    Program,
    XBlock,
}

impl ProductType {
    /// Association table holding this product's skills
    pub fn table(&self) -> &'static str {
        match self {
            ProductType::Course => "course_skills",
            ProductType::Program => "program_skills",
            ProductType::XBlock => "xblock_skill_data",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Course => "course",
            ProductType::Program => "program",
            ProductType::XBlock => "xblock",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "course" => Ok(ProductType::Course),
            "program" => Ok(ProductType::Program),
            "xblock" => Ok(ProductType::XBlock),
            other => Err(crate::Error::InvalidInput(format!("unknown product type: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_round_trips_through_str() {
        for pt in [ProductType::Course, ProductType::Program, ProductType::XBlock] {
            assert_eq!(pt.as_str().parse::<ProductType>().unwrap(), pt);
        }
        assert!("video".parse::<ProductType>().is_err());
    }

    #[test]
    fn test_total_votes() {
        let row = XBlockSkillData {
            id: 1,
            xblock_id: 1,
            skill_id: 1,
            verified_count: 8,
            ignored_count: 2,
            verified: false,
            is_blacklisted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(row.total_votes(), 10);
    }
}
