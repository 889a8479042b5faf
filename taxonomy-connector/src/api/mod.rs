//! HTTP API handlers for taxonomy-connector
//!
//! Read access to skills, jobs, postings and xblock tags, skills quiz
//! records, and event ingestion. Everything under `/api/v1` is throttled per
//! client.

pub mod events;
pub mod health;
pub mod jobs;
pub mod quiz;
pub mod skills;
pub mod throttle;
pub mod xblocks;

pub use events::event_routes;
pub use health::health_routes;
pub use jobs::job_routes;
pub use quiz::quiz_routes;
pub use skills::skill_routes;
pub use throttle::{throttle_requests, ApiThrottle};
pub use xblocks::xblock_routes;
