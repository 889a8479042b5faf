//! Retry logic for vendor rate limiting
//!
//! A request answered with HTTP 429 is retried with exponential backoff.
//! Any other error returns immediately.

use crate::vendor::VendorError;
use std::time::Duration;

/// Backoff settings for HTTP 429 retries
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each later retry
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation`, retrying while it reports HTTP 429
///
/// After `max_retries` retries the last 429 becomes
/// [`VendorError::RateLimited`].
pub async fn retry_on_rate_limit<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, VendorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VendorError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Vendor request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_rate_limit() => {
                if attempt > policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        "Vendor rate limit persisted, giving up"
                    );
                    return Err(VendorError::RateLimited { attempts: attempt });
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Vendor returned 429, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
