//! Event types for the taxonomy connector
//!
//! Host-platform signals arrive either over `POST /api/v1/events` or through
//! the in-process [`EventBus`], and are dispatched by kind to registered
//! handlers.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Host content events the connector reacts to
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "XBlockDeleted", "usage_key": "block-v1:..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaxonomyEvent {
    /// An xblock was published in the authoring tool
    XBlockPublished {
        usage_key: String,
        #[serde(default)]
        block_type: Option<String>,
    },

    /// An xblock was removed from its course
    XBlockDeleted { usage_key: String },

    /// An xblock was copied; skill associations follow the copy
    XBlockDuplicated {
        source_usage_key: String,
        usage_key: String,
    },

    /// A learner confirmed or rejected the skills shown for an xblock
    XBlockSkillVerified {
        usage_key: String,
        #[serde(default)]
        verified_skills: Vec<i64>,
        #[serde(default)]
        ignored_skills: Vec<i64>,
    },

    CourseUpdated { course_id: String },

    ProgramUpdated { program_id: String },
}

/// Discriminant of [`TaxonomyEvent`], used as the handler registration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    XBlockPublished,
    XBlockDeleted,
    XBlockDuplicated,
    XBlockSkillVerified,
    CourseUpdated,
    ProgramUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::XBlockPublished,
        EventKind::XBlockDeleted,
        EventKind::XBlockDuplicated,
        EventKind::XBlockSkillVerified,
        EventKind::CourseUpdated,
        EventKind::ProgramUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::XBlockPublished => "XBlockPublished",
            EventKind::XBlockDeleted => "XBlockDeleted",
            EventKind::XBlockDuplicated => "XBlockDuplicated",
            EventKind::XBlockSkillVerified => "XBlockSkillVerified",
            EventKind::CourseUpdated => "CourseUpdated",
            EventKind::ProgramUpdated => "ProgramUpdated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaxonomyEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TaxonomyEvent::XBlockPublished { .. } => EventKind::XBlockPublished,
            TaxonomyEvent::XBlockDeleted { .. } => EventKind::XBlockDeleted,
            TaxonomyEvent::XBlockDuplicated { .. } => EventKind::XBlockDuplicated,
            TaxonomyEvent::XBlockSkillVerified { .. } => EventKind::XBlockSkillVerified,
            TaxonomyEvent::CourseUpdated { .. } => EventKind::CourseUpdated,
            TaxonomyEvent::ProgramUpdated { .. } => EventKind::ProgramUpdated,
        }
    }
}

/// Broadcast bus for in-process event delivery
///
/// Every subscriber receives every event emitted after it subscribed.
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaxonomyEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaxonomyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TaxonomyEvent,
    ) -> Result<usize, broadcast::error::SendError<TaxonomyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TaxonomyEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
