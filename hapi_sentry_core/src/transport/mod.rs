/**
 * Transport layer: how events reach the backend.
 *
 * - `request`: request/reply values passed through the chain
 * - `http`: `HttpClient` seam and the reqwest implementation
 * - `plugin`: ordered request-transform stages
 * - `dispatcher`: background tasks, delivery reports
 *
 * `Transport::send` never waits for the network. It checks rate limits,
 * builds the request on the caller, and hands the rest to a dispatch task.
 * The returned `Response` says what happened *synchronously*; delivery
 * itself is only observable through the `DispatchHandle` or the report
 * channel.
 */
pub mod dispatcher;
pub mod http;
pub mod plugin;
pub mod request;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use reqwest::header::CONTENT_TYPE;
use tracing::warn;
use uuid::Uuid;

pub use dispatcher::{DeliveryOutcome, DeliveryReport, DispatchHandle, Dispatcher};
pub use http::{HttpClient, ReqwestClient};
pub use plugin::{Next, Plugin, PluginChain};
pub use request::{OutgoingRequest, Reply};

use crate::error::{Result, TransportError};
use crate::options::Options;
use crate::protocol::constants::{ENVELOPE_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::protocol::serializer::PayloadSerializer;
use crate::protocol::types::{Event, EventKind};
use crate::ratelimit::RateLimiter;

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// What `send` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Handed to a dispatch task. Not a delivery confirmation.
    Accepted,

    /// Dropped locally because the event's category is backing off.
    RateLimited,

    /// The event could not be serialized.
    Invalid,

    /// Discarded by a transport that sends nothing.
    Skipped,
}

#[derive(Debug)]
pub struct Response {
    pub status: ResponseStatus,
    pub event_id: Uuid,
    pub kind: EventKind,

    /// Present only for `Accepted`.
    pub dispatch: Option<DispatchHandle>,
}

impl Response {
    fn new(status: ResponseStatus, event: &Event) -> Self {
        Self {
            status,
            event_id: event.event_id,
            kind: event.kind,
            dispatch: None,
        }
    }

    fn accepted(event: &Event, handle: DispatchHandle) -> Self {
        Self {
            dispatch: Some(handle),
            ..Self::new(ResponseStatus::Accepted, event)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ResponseStatus::Accepted
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub trait Transport: Send + Sync {
    /**
     * Sends `event` without blocking on the network.
     *
     * # Returns
     * `Err` only for configuration problems (missing DSN, unencodable
     * credentials). Every runtime condition is a `Response` status.
     */
    fn send(&self, event: &Event) -> Result<Response>;

    /**
     * Releases the transport. Tasks are independent, so there is nothing
     * to drain.
     *
     * # Returns
     * `true` when closing completed within `timeout`.
     */
    fn close(&self, _timeout: Option<Duration>) -> bool {
        true
    }
}

/// Transport that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, event: &Event) -> Result<Response> {
        Ok(Response::new(ResponseStatus::Skipped, event))
    }
}

/**
 * Non-blocking HTTP transport.
 *
 * Owns the serializer, the rate limiter shared with its dispatch tasks and
 * the dispatcher. One plugin chain is built per send.
 */
pub struct HttpTransport {
    options: Arc<Options>,
    serializer: PayloadSerializer,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Dispatcher,
}

impl HttpTransport {
    /// Creates a transport backed by a `reqwest` client built from `options`.
    pub fn new(options: Options) -> Result<Self> {
        let client = ReqwestClient::new(options.http_timeout, options.http_connect_timeout)?;
        Self::with_client(options, Arc::new(client))
    }

    /// Creates a transport that sends through `client`.
    pub fn with_client(options: Options, client: Arc<dyn HttpClient>) -> Result<Self> {
        let rate_limiter = Arc::new(RateLimiter::new());
        let dispatcher = Dispatcher::new(
            client,
            options.report_capacity,
            &options.logger,
        )?;
        let serializer = PayloadSerializer::new(options.dsn.clone(), options.is_tracing_enabled());

        Ok(Self {
            options: Arc::new(options),
            serializer,
            rate_limiter,
            dispatcher,
        })
    }

    /// Delivery reports of every dispatched event.
    pub fn delivery_reports(&self) -> Receiver<DeliveryReport> {
        self.dispatcher.reports()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Transport for HttpTransport {
    fn send(&self, event: &Event) -> Result<Response> {
        let dsn = self.options.dsn.as_ref().ok_or(TransportError::MissingDsn)?;

        if self.rate_limiter.is_rate_limited(event.kind) {
            warn!(
                logger = %self.options.logger,
                event_id = %event.event_id.simple(),
                kind = %event.kind,
                "event has been rate limited, not sending"
            );
            return Ok(Response::new(ResponseStatus::RateLimited, event));
        }

        let (url, content_type) = if self.serializer.uses_envelope(event.kind) {
            (dsn.envelope_api_url(), ENVELOPE_CONTENT_TYPE)
        } else {
            (dsn.store_api_url(), JSON_CONTENT_TYPE)
        };

        let body = match self.serializer.serialize(event) {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    logger = %self.options.logger,
                    event_id = %event.event_id.simple(),
                    error = %err,
                    "failed to serialize event, not sending"
                );
                return Ok(Response::new(ResponseStatus::Invalid, event));
            }
        };

        let request = OutgoingRequest::post(&url)?
            .with_header(CONTENT_TYPE, content_type)?
            .with_body(body);
        let chain = PluginChain::for_transport(&self.options, dsn, &self.rate_limiter)?;

        let handle = self.dispatcher.dispatch(chain, request, event.event_id);
        Ok(Response::accepted(event, handle))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds the transport a client sends through.
pub trait TransportFactory: Send + Sync {
    fn create_transport(&self, options: &Options) -> Result<Arc<dyn Transport>>;
}

/**
 * Creates `HttpTransport`s, or a `NullTransport` when no DSN is configured.
 *
 * An injected `HttpClient` is shared by every transport it creates.
 */
#[derive(Default, Clone)]
pub struct HttpTransportFactory {
    client: Option<Arc<dyn HttpClient>>,
}

impl HttpTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client: Some(client),
        }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create_transport(&self, options: &Options) -> Result<Arc<dyn Transport>> {
        if options.dsn.is_none() {
            return Ok(Arc::new(NullTransport));
        }

        let transport = match &self.client {
            Some(client) => HttpTransport::with_client(options.clone(), Arc::clone(client))?,
            None => HttpTransport::new(options.clone())?,
        };
        Ok(Arc::new(transport))
    }
}
