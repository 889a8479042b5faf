//! taxonomy-connector library interface
//!
//! Exposes the vendor client, batch services, event handlers and the REST
//! router for the binary and for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pagination;
pub mod providers;
pub mod search;
pub mod services;
pub mod utils;
pub mod vendor;

pub use crate::error::{ApiError, ApiResult};

use api::ApiThrottle;
use axum::Router;
use chrono::{DateTime, Utc};
use services::EventDispatcher;
use sqlx::SqlitePool;
use std::sync::Arc;
use taxonomy_common::events::EventBus;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// In-process event delivery
    pub event_bus: EventBus,
    /// Handlers for events posted over HTTP
    pub dispatcher: Arc<EventDispatcher>,
    /// Per-client limiter for `/api/v1`
    pub throttle: ApiThrottle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        dispatcher: Arc<EventDispatcher>,
        throttle: ApiThrottle,
    ) -> Self {
        Self {
            db,
            event_bus,
            dispatcher,
            throttle,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
///
/// `/health` is not throttled.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(api::skill_routes())
        .merge(api::job_routes())
        .merge(api::xblock_routes())
        .merge(api::quiz_routes())
        .merge(api::event_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::throttle_requests,
        ));

    Router::new()
        .merge(api_routes)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
