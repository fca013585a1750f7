//! Rate-limit stage: feeds every raw reply's headers to the `RateLimiter`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Next, Plugin};
use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::transport::request::{OutgoingRequest, Reply};

/**
 * Records the limits announced by each reply before any error
 * classification happens.
 *
 * Sits below the retry and error stages, so it sees every attempt,
 * 5xx replies included.
 */
pub struct RateLimitPlugin {
    limiter: Arc<RateLimiter>,
}

impl RateLimitPlugin {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Plugin for RateLimitPlugin {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, request: OutgoingRequest, next: Next<'_>) -> Result<Reply> {
        let reply = next.run(request).await?;
        self.limiter.update_from_reply(reply.status, &reply.headers);
        Ok(reply)
    }
}
