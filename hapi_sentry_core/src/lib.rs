/*!
 * hapi_sentry_core: the non-blocking Sentry transport engine.
 *
 * This crate builds events, turns them into HTTP requests and dispatches
 * them on tokio tasks without ever blocking the caller. Applications
 * should usually depend on the `hapi_sentry` facade, which adds
 * configuration loading and the panic hook.
 *
 * # Module structure
 *
 * - `protocol/`: what we send: events, DSN, payload serializer, stack capture
 * - `transport/`: how we deliver: plugin chain, HTTP client, dispatch tasks
 * - `ratelimit`: per-category backoff from backend replies
 * - `client`: event defaults, `before_send`, routing to a transport
 * - `registry`: init-once client binding
 */

mod client;
mod error;
mod options;
mod protocol;
mod ratelimit;
mod registry;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::Client;
pub use error::{Result, TransportError};
pub use options::{BeforeSend, Options};
pub use protocol::constants::{user_agent, SDK_NAME, SDK_VERSION};
pub use protocol::dsn::{Dsn, DsnError};
pub use protocol::serializer::PayloadSerializer;
pub use protocol::stacktrace::{capture_stacktrace, convert_backtrace};
pub use protocol::types::{
    CheckIn, CheckInStatus, Event, EventKind, Exception, ExceptionList, Frame, Level, Mechanism,
    SdkInfo, Stacktrace,
};
pub use ratelimit::RateLimiter;
pub use registry::Registry;
pub use transport::{
    DeliveryOutcome, DeliveryReport, DispatchHandle, HttpTransport, HttpTransportFactory,
    NullTransport, Response, ResponseStatus, Transport, TransportFactory,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/**
 * Creates a client from `options` and binds it to the process-default
 * registry.
 *
 * Idempotent: if a client is already bound, it is returned and `options`
 * are ignored.
 *
 * # Returns
 * `Err` only if the transport cannot be built (e.g. the HTTP client or the
 * dispatch runtime fails to start).
 */
pub fn init(options: Options) -> Result<Arc<Client>> {
    let registry = Registry::global();
    if let Some(client) = registry.client() {
        debug!("sentry client already initialized, keeping the existing one");
        return Ok(Arc::clone(client));
    }

    let client = Arc::new(Client::new(options)?);
    registry.bind_client(Arc::clone(&client));

    // a concurrent init may have won the race
    Ok(registry.client().map(Arc::clone).unwrap_or(client))
}

/**
 * Reports an error through the process-default client.
 *
 * Silent no-op returning `None` if no client is bound.
 */
pub fn capture_error<E: std::error::Error + ?Sized>(error: &E) -> Option<Response> {
    Registry::global().client()?.capture_error(error)
}

/// Sends a pre-built event through the process-default client.
pub fn capture_event(event: Event) -> Option<Response> {
    Registry::global().client()?.capture_event(event)
}

pub fn capture_message(message: &str, level: Level) -> Option<Response> {
    Registry::global().client()?.capture_message(message, level)
}

/// Closes the process-default client's transport. `true` when nothing is bound.
pub fn close(timeout: Option<Duration>) -> bool {
    match Registry::global().client() {
        Some(client) => client.close(timeout),
        None => true,
    }
}
