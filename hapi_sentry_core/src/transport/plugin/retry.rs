//! Retry stage: re-runs the rest of the chain when it fails.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Next, Plugin};
use crate::error::Result;
use crate::transport::request::{OutgoingRequest, Reply};

/// Upper bound on the backoff exponent.
const MAX_BACKOFF_SHIFT: u32 = 10;

/**
 * Retries the downstream stages up to `retries` times.
 *
 * Every error is retried; there is no error-class distinction at this
 * layer. Each attempt gets a clone of the request as it reached this stage,
 * so downstream mutations (e.g. compression) never accumulate.
 */
pub struct RetryPlugin {
    retries: u32,
    delay: Duration,
}

impl RetryPlugin {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            delay: Duration::ZERO,
        }
    }

    /// Delay before the first retry; doubled for each subsequent one.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.delay.saturating_mul(1 << shift)
    }
}

#[async_trait]
impl Plugin for RetryPlugin {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(&self, request: OutgoingRequest, next: Next<'_>) -> Result<Reply> {
        let mut retry = 0;

        loop {
            match next.run(request.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(err) if retry < self.retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        error = %err,
                        retry,
                        max_retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        "sending to sentry failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    debug!(error = %err, retries = retry, "giving up on request");
                    return Err(err);
                }
            }
        }
    }
}
