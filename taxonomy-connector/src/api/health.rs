//! Health check endpoint
//!
//! Not throttled. Reports `degraded` when the database does not answer.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use taxonomy_common::events::EventKind;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: bool,
    /// Event kinds with a registered handler
    pub event_kinds: Vec<EventKind>,
    pub event_listeners: usize,
    pub throttle_per_minute: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Health check database probe failed: {}", e);
            false
        }
    };

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        module: "taxonomy-connector",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        database,
        event_kinds: state.dispatcher.registered_kinds(),
        event_listeners: state.event_bus.subscriber_count(),
        throttle_per_minute: state.throttle.rate(),
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
