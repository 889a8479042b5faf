//! Batch refresh, finalization and event handling services

pub mod event_handlers;
pub mod finalizer;
pub mod industry_sync;
pub mod job_refresh;
pub mod skill_details;
pub mod skill_refresh;
pub mod task_queue;
pub mod xblock_refresh;

pub use event_handlers::{run_event_listener, EventDispatcher, HandlerContext, HandlerOutcome};
pub use finalizer::{FinalizeReport, XBlockSkillFinalizer};
pub use industry_sync::sync_industries;
pub use job_refresh::JobRefresher;
pub use skill_details::fetch_skill_details;
pub use skill_refresh::SkillRefresher;
pub use task_queue::{DisabledTaskRunner, RefreshTaskRunner, TaggingTask, TaskQueue, TaskRunner};
pub use xblock_refresh::{XBlockRefresher, XBlockTarget};

use crate::vendor::VendorError;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a batch command
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Common(#[from] taxonomy_common::Error),

    #[error(transparent)]
    Vendor(#[from] VendorError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Common(err.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome counts of a refresh run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Items tagged (or that would be tagged without `commit`)
    pub success: usize,
    /// Items with no text or unchanged content
    pub skipped: usize,
    /// Items whose vendor call failed
    pub failure: usize,
    /// Vendor skill records that could not be parsed
    pub malformed: usize,
}

impl RefreshSummary {
    pub fn absorb(&mut self, other: RefreshSummary) {
        self.success += other.success;
        self.skipped += other.skipped;
        self.failure += other.failure;
        self.malformed += other.malformed;
    }
}

/// Classify a per-item vendor failure: fatal errors abort, others are counted
pub(crate) fn tolerate(err: VendorError, item: &str) -> ServiceResult<()> {
    if err.is_fatal() {
        tracing::error!(item, error = %err, "Vendor unavailable, aborting");
        return Err(err.into());
    }
    tracing::warn!(item, error = %err, "Vendor call failed, skipping item");
    Ok(())
}
