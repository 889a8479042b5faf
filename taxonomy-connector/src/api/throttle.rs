//! Per-client request throttle for the `/api/v1` routes
//!
//! Clients identify themselves with the `X-Taxonomy-Client` header; requests
//! without it share the `anonymous` bucket.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::{error::ApiError, AppState};

pub const CLIENT_HEADER: &str = "x-taxonomy-client";
pub const ANONYMOUS_CLIENT: &str = "anonymous";
pub const THROTTLE_SCOPE: &str = "taxonomy-api-throttle-scope";

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Keyed rate limiter shared across handlers
#[derive(Clone)]
pub struct ApiThrottle {
    limiter: Arc<KeyedLimiter>,
    per_minute: u32,
}

impl ApiThrottle {
    /// Allow `per_minute` requests per client; zero is treated as one
    pub fn per_minute(per_minute: u32) -> Self {
        let rate = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(rate))),
            per_minute: rate.get(),
        }
    }

    pub fn rate(&self) -> u32 {
        self.per_minute
    }

    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }
}

/// Middleware rejecting over-quota clients with 429
pub async fn throttle_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = request
        .headers()
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string();

    if !state.throttle.check(&client) {
        tracing::warn!(client = %client, scope = THROTTLE_SCOPE, "Request throttled");
        return Err(ApiError::Throttled(format!(
            "{} allows {} requests per minute",
            THROTTLE_SCOPE,
            state.throttle.rate()
        )));
    }

    Ok(next.run(request).await)
}
