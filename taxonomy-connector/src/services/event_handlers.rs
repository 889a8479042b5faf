//! Taxonomy event handlers
//!
//! [`EventDispatcher`] maps each [`EventKind`] to one handler through an
//! explicit registration table. Events reach it from `POST /api/v1/events`
//! or from the in-process [`EventBus`] via [`run_event_listener`].
//!
//! Deliveries are not deduplicated: a redelivered vote event is counted
//! again.

use super::task_queue::{TaggingTask, TaskQueue};
use crate::db::xblocks::{delete_xblock, duplicate_xblock, get_xblock, increment_vote_counts, Vote};
use crate::providers::derive_course_key;
use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use taxonomy_common::events::{EventBus, EventKind, TaxonomyEvent};
use taxonomy_common::{Error, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandlerOutcome {
    Enqueued { task_id: Uuid },
    Deleted { found: bool },
    Duplicated { copied: u64 },
    VotesRecorded { verified: u64, ignored: u64 },
    Skipped { reason: String },
}

impl HandlerOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        HandlerOutcome::Skipped { reason: reason.into() }
    }
}

/// Shared resources handlers act on
#[derive(Clone)]
pub struct HandlerContext {
    pub db: SqlitePool,
    pub queue: TaskQueue,
}

pub type Handler =
    for<'a> fn(&'a HandlerContext, &'a TaxonomyEvent) -> BoxFuture<'a, Result<HandlerOutcome>>;

pub struct EventDispatcher {
    ctx: HandlerContext,
    handlers: HashMap<EventKind, Handler>,
}

impl EventDispatcher {
    /// Dispatcher with the default handler table
    pub fn new(ctx: HandlerContext) -> Self {
        let mut dispatcher = Self {
            ctx,
            handlers: HashMap::new(),
        };
        dispatcher.register(EventKind::XBlockPublished, on_xblock_published);
        dispatcher.register(EventKind::XBlockDeleted, on_xblock_deleted);
        dispatcher.register(EventKind::XBlockDuplicated, on_xblock_duplicated);
        dispatcher.register(EventKind::XBlockSkillVerified, on_xblock_skill_verified);
        dispatcher.register(EventKind::CourseUpdated, on_course_updated);
        dispatcher.register(EventKind::ProgramUpdated, on_program_updated);
        dispatcher
    }

    /// Install or replace the handler for `kind`
    pub fn register(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn registered_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub async fn dispatch(&self, event: &TaxonomyEvent) -> Result<HandlerOutcome> {
        let kind = event.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            warn!(%kind, "No handler registered");
            return Ok(HandlerOutcome::skipped(format!("no handler for {}", kind)));
        };

        debug!(%kind, "Dispatching event");
        let outcome = handler(&self.ctx, event).await?;
        info!(%kind, ?outcome, "Event handled");
        Ok(outcome)
    }
}

/// Dispatch events from the bus until it closes
pub async fn run_event_listener(dispatcher: Arc<EventDispatcher>, event_bus: EventBus) {
    let mut rx = event_bus.subscribe();
    debug!("Event listener started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = dispatcher.dispatch(&event).await {
                    warn!(kind = %event.kind(), "Event handler failed: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event listener lagged {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event bus closed, listener stopping");
                break;
            }
        }
    }
}

fn mismatch(expected: EventKind, event: &TaxonomyEvent) -> Error {
    Error::Internal(format!("{} handler received {} event", expected, event.kind()))
}

fn on_xblock_published<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::XBlockPublished { usage_key, block_type } = event else {
            return Err(mismatch(EventKind::XBlockPublished, event));
        };
        debug!(usage_key = %usage_key, ?block_type, "XBlock published");

        let task_id = ctx
            .queue
            .enqueue(TaggingTask::XBlock {
                usage_key: usage_key.clone(),
            })
            .await?;
        Ok(HandlerOutcome::Enqueued { task_id })
    })
}

fn on_xblock_deleted<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::XBlockDeleted { usage_key } = event else {
            return Err(mismatch(EventKind::XBlockDeleted, event));
        };

        let found = delete_xblock(&ctx.db, usage_key).await?;
        if !found {
            info!(usage_key = %usage_key, "Deleted xblock was never tagged");
        }
        Ok(HandlerOutcome::Deleted { found })
    })
}

fn on_xblock_duplicated<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::XBlockDuplicated { source_usage_key, usage_key } = event else {
            return Err(mismatch(EventKind::XBlockDuplicated, event));
        };

        let mut tx = ctx.db.begin().await?;
        let copied = duplicate_xblock(
            &mut tx,
            source_usage_key,
            usage_key,
            derive_course_key(usage_key).as_deref(),
        )
        .await?;
        tx.commit().await?;

        match copied {
            Some(copied) => Ok(HandlerOutcome::Duplicated { copied }),
            None => {
                info!(source_usage_key = %source_usage_key, "Source xblock has no skills to copy");
                Ok(HandlerOutcome::skipped(format!("xblock {} not tagged", source_usage_key)))
            }
        }
    })
}

fn on_xblock_skill_verified<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::XBlockSkillVerified {
            usage_key,
            verified_skills,
            ignored_skills,
        } = event
        else {
            return Err(mismatch(EventKind::XBlockSkillVerified, event));
        };

        if verified_skills.is_empty() && ignored_skills.is_empty() {
            info!(usage_key = %usage_key, "Vote event carries no skills");
            return Ok(HandlerOutcome::skipped("no skills in vote"));
        }

        let Some(xblock) = get_xblock(&ctx.db, usage_key).await? else {
            warn!(usage_key = %usage_key, "Vote for unknown xblock");
            return Ok(HandlerOutcome::skipped(format!("xblock {} not found", usage_key)));
        };

        let mut tx = ctx.db.begin().await?;
        let verified = increment_vote_counts(&mut *tx, xblock.id, verified_skills, Vote::Verified).await?;
        let ignored = increment_vote_counts(&mut *tx, xblock.id, ignored_skills, Vote::Ignored).await?;
        tx.commit().await?;

        Ok(HandlerOutcome::VotesRecorded { verified, ignored })
    })
}

fn on_course_updated<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::CourseUpdated { course_id } = event else {
            return Err(mismatch(EventKind::CourseUpdated, event));
        };
        let task_id = ctx
            .queue
            .enqueue(TaggingTask::Course {
                course_key: course_id.clone(),
            })
            .await?;
        Ok(HandlerOutcome::Enqueued { task_id })
    })
}

fn on_program_updated<'a>(
    ctx: &'a HandlerContext,
    event: &'a TaxonomyEvent,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        let TaxonomyEvent::ProgramUpdated { program_id } = event else {
            return Err(mismatch(EventKind::ProgramUpdated, event));
        };
        let task_id = ctx
            .queue
            .enqueue(TaggingTask::Program {
                program_uuid: program_id.clone(),
            })
            .await?;
        Ok(HandlerOutcome::Enqueued { task_id })
    })
}
