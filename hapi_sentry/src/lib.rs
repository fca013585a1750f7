/*!
 * hapi_sentry: non-blocking Sentry error reporting for tokio services.
 *
 * This is the crate applications depend on. It re-exports the core API,
 * loads configuration and wires up the panic hook through a single `init`
 * call.
 *
 * # Quick start
 *
 * ```ignore
 * #[tokio::main]
 * async fn main() {
 *     hapi_sentry::init("https://public@o1.ingest.example.com/42")?;
 *
 *     if let Err(err) = run().await {
 *         hapi_sentry::capture_exception(&err);
 *     }
 * }
 * ```
 *
 * # From a config file
 *
 * ```ignore
 * let config = hapi_sentry::SentryConfig::from_file("sentry.toml")?;
 * hapi_sentry::init(config)?;
 * ```
 */

mod config;

pub use config::{ConfigError, SentryConfig};

// ---------------------------------------------------------------------------
// Re-exports from hapi_sentry_core: the public surface area
// ---------------------------------------------------------------------------

pub use hapi_sentry_core::{
    capture_error, capture_event, capture_message, close, transport, CheckIn, CheckInStatus,
    Client, DeliveryOutcome, DeliveryReport, DispatchHandle, Dsn, Event, EventKind, Level,
    Options, Registry, Response, ResponseStatus, Transport,
};

use std::sync::Arc;

use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Sentry handle
// ---------------------------------------------------------------------------

/**
 * Entry point bound to one `Registry`.
 *
 * `Sentry::new()` uses the process-default registry, the one behind the
 * free functions of this crate. Tests and embedders can bind their own.
 */
#[derive(Clone, Copy)]
pub struct Sentry {
    registry: &'static Registry,
}

impl Default for Sentry {
    fn default() -> Self {
        Self::new()
    }
}

impl Sentry {
    pub fn new() -> Self {
        Self::with_registry(Registry::global())
    }

    pub fn with_registry(registry: &'static Registry) -> Self {
        Self { registry }
    }

    /**
     * Builds a client from `config` and binds it.
     *
     * Idempotent: once a client is bound, later calls change nothing.
     * A blank DSN leaves reporting disabled.
     *
     * # Returns
     * `Ok(true)` if this call bound a client, `Ok(false)` if reporting is
     * disabled or a client was already bound. `Err` for an invalid DSN or
     * a transport that cannot start.
     */
    pub fn init(&self, config: impl Into<SentryConfig>) -> Result<bool, ConfigError> {
        let config = config.into();

        if self.registry.is_bound() {
            debug!("sentry already initialized, ignoring new configuration");
            return Ok(false);
        }
        if !config.is_enabled() {
            debug!("no sentry dsn configured, error reporting disabled");
            return Ok(false);
        }

        let options = config.to_options()?;
        let client = Arc::new(Client::new(options)?);
        if !self.registry.bind_client(client) {
            return Ok(false);
        }

        if config.catch_panics {
            hapi_sentry_panic::install_with(self.registry);
        }

        info!(logger = %config.logger, "sentry error reporting enabled");
        Ok(true)
    }

    pub fn client(&self) -> Option<&Arc<Client>> {
        self.registry.client()
    }

    /**
     * Reports an error value with its `source()` chain.
     *
     * Never fails: returns `None` when reporting is disabled or the event
     * was not sent, which is logged by the client.
     */
    pub fn capture_exception<E: std::error::Error + ?Sized>(&self, error: &E) -> Option<Response> {
        self.registry.client()?.capture_error(error)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/**
 * Initializes reporting on the process-default registry.
 *
 * Accepts either a bare DSN string or a full `SentryConfig`.
 */
pub fn init(config: impl Into<SentryConfig>) -> Result<bool, ConfigError> {
    Sentry::new().init(config)
}

/// Reports `error` through the process-default client.
pub fn capture_exception<E: std::error::Error + ?Sized>(error: &E) -> Option<Response> {
    Sentry::new().capture_exception(error)
}
