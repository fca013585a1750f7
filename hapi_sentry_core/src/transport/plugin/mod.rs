/**
 * Plugin chain: an ordered pipeline of request-transform stages wrapping the
 * terminal `HttpClient` call.
 *
 * ```text
 *  request ─► HeaderSet ─► Authentication ─► Retry ─► Error ─► RateLimit ─► [GzipEncoder ─► Decoder] ─► HttpClient
 *  reply   ◄───────────────────────────────────────────────────────────────────────────────────────────┘
 * ```
 *
 * Each stage receives the request by value plus a `Next` handle for the
 * rest of the chain. A stage may modify the request before calling
 * `next.run`, inspect or rewrite the reply afterwards, or call `next.run`
 * several times (retry). `Next` is `Copy`, so re-running the remainder of
 * the chain is just another call.
 *
 * The transport builds a fresh chain per send with `PluginChain::for_transport`.
 * Header and authentication stages sit in front of the retry stage, so every
 * attempt carries the same headers. The rate-limit stage sits below the
 * error stage, so the limiter sees the headers of every raw reply.
 */
mod compression;
mod errors;
mod headers;
mod limits;
mod retry;

pub use compression::{DecoderPlugin, GzipEncoderPlugin};
pub use errors::ErrorPlugin;
pub use headers::{AuthenticationPlugin, HeaderSetPlugin};
pub use limits::RateLimitPlugin;
pub use retry::RetryPlugin;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, USER_AGENT};

use super::http::HttpClient;
use super::request::{OutgoingRequest, Reply};
use crate::error::Result;
use crate::options::Options;
use crate::protocol::constants::user_agent;
use crate::protocol::dsn::Dsn;
use crate::ratelimit::RateLimiter;

/// One stage of the chain.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short name used for inspection and logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, request: OutgoingRequest, next: Next<'_>) -> Result<Reply>;
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    plugins: &'a [Box<dyn Plugin>],
    client: &'a dyn HttpClient,
}

impl<'a> Next<'a> {
    /// Runs the remaining stages, then the terminal client.
    pub async fn run(self, request: OutgoingRequest) -> Result<Reply> {
        match self.plugins.split_first() {
            Some((plugin, rest)) => {
                let next = Next {
                    plugins: rest,
                    client: self.client,
                };
                plugin.handle(request, next).await
            }
            None => self.client.execute(request).await,
        }
    }
}

pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginChain {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /**
     * Builds the fixed stage list used by the HTTP transport.
     *
     * # Arguments
     * * `options`: retry and compression settings.
     * * `dsn`: credentials for the authentication stage.
     * * `limiter`: updated from every reply.
     *
     * # Errors
     * Fails only if the SDK identity or DSN credentials cannot be encoded
     * as header values.
     */
    pub fn for_transport(
        options: &Options,
        dsn: &Dsn,
        limiter: &Arc<RateLimiter>,
    ) -> Result<Self> {
        let agent = user_agent();

        let mut plugins: Vec<Box<dyn Plugin>> = vec![
            Box::new(HeaderSetPlugin::new(vec![(
                USER_AGENT,
                HeaderValue::from_str(&agent)?,
            )])),
            Box::new(AuthenticationPlugin::new(dsn, &agent)?),
            Box::new(RetryPlugin::new(options.send_attempts).with_delay(options.retry_delay)),
            Box::new(ErrorPlugin::only_server_errors()),
            Box::new(RateLimitPlugin::new(Arc::clone(limiter))),
        ];

        if options.enable_compression {
            plugins.push(Box::new(GzipEncoderPlugin));
            plugins.push(Box::new(DecoderPlugin));
        }

        Ok(Self::new(plugins))
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn execute(&self, client: &dyn HttpClient, request: OutgoingRequest) -> Result<Reply> {
        Next {
            plugins: &self.plugins,
            client,
        }
        .run(request)
        .await
    }
}
