//! Database queries for taxonomy data
//!
//! Single-statement reads and writes are generic over `sqlx::Executor` so
//! they run against the pool or inside a caller's transaction
//! (`&mut *tx`). Multi-statement writes take `&mut SqliteConnection`.

pub mod job_postings;
pub mod jobs;
pub mod product_skills;
pub mod quiz;
pub mod settings;
pub mod skills;
pub mod xblocks;

/// Blacklist side selected by an association query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationFilter {
    /// Included associations (the default for consumers)
    Whitelisted,
    Blacklisted,
    All,
}

impl AssociationFilter {
    /// SQL predicate on `{alias}.is_blacklisted`
    pub fn predicate(&self, alias: &str) -> String {
        match self {
            AssociationFilter::Whitelisted => format!("{}.is_blacklisted = 0", alias),
            AssociationFilter::Blacklisted => format!("{}.is_blacklisted = 1", alias),
            AssociationFilter::All => "1 = 1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert_eq!(AssociationFilter::Whitelisted.predicate("cs"), "cs.is_blacklisted = 0");
        assert_eq!(AssociationFilter::Blacklisted.predicate("d"), "d.is_blacklisted = 1");
        assert_eq!(AssociationFilter::All.predicate("d"), "1 = 1");
    }
}
