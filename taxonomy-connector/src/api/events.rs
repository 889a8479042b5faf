//! Event ingestion endpoint
//!
//! POST /api/v1/events takes a [`TaxonomyEvent`] and returns the handler
//! outcome.

use axum::{extract::State, routing::post, Json, Router};
use taxonomy_common::events::TaxonomyEvent;

use crate::error::ApiResult;
use crate::services::HandlerOutcome;
use crate::AppState;

/// POST /api/v1/events
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<TaxonomyEvent>,
) -> ApiResult<Json<HandlerOutcome>> {
    tracing::debug!(kind = %event.kind(), "Event received over HTTP");

    match state.dispatcher.dispatch(&event).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/api/v1/events", post(post_event))
}
