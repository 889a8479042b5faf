//! # Taxonomy Common Library
//!
//! Shared code for the taxonomy connector crates:
//! - Database schema, row models and initialization
//! - Event types (TaxonomyEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
