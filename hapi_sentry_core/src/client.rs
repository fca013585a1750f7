/**
 * The SDK client: fills event defaults, runs `before_send` and routes
 * events to a transport.
 *
 * Lifecycle:
 * 1. A `Client` is built from `Options` and a `TransportFactory`.
 * 2. It is bound to a `Registry` (the process-default one for the free
 *    functions in the crate root).
 * 3. `capture_*` calls build an `Event`, finish it here, and hand it to the
 *    transport, which returns before the network is touched.
 *
 * Callers never see a failure: transport errors are logged and swallowed,
 * panics inside `before_send` are caught.
 */
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::options::Options;
use crate::protocol::stacktrace::capture_stacktrace;
use crate::protocol::types::{Event, Level};
use crate::transport::{HttpTransportFactory, Response, Transport, TransportFactory};

pub struct Client {
    options: Arc<Options>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /**
     * Creates a client with the default HTTP transport.
     *
     * Without a DSN the client is still usable; events go to a
     * `NullTransport`.
     */
    pub fn new(options: Options) -> Result<Self> {
        Self::with_factory(options, &HttpTransportFactory::new())
    }

    pub fn with_factory(options: Options, factory: &dyn TransportFactory) -> Result<Self> {
        let transport = factory.create_transport(&options)?;
        Ok(Self::with_transport(options, transport))
    }

    pub fn with_transport(options: Options, transport: Arc<dyn Transport>) -> Self {
        Self {
            options: Arc::new(options),
            transport,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /**
     * Sends a pre-built event.
     *
     * # Returns
     * The transport's response, or `None` if `before_send` dropped the
     * event or the transport rejected it (logged).
     */
    pub fn capture_event(&self, event: Event) -> Option<Response> {
        let event = self.prepare_event(event)?;

        match self.transport.send(&event) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(
                    logger = %self.options.logger,
                    event_id = %event.event_id.simple(),
                    error = %err,
                    "failed to send event to sentry"
                );
                None
            }
        }
    }

    /// Reports an error and its `source()` chain with a stack trace taken here.
    pub fn capture_error<E: std::error::Error + ?Sized>(&self, error: &E) -> Option<Response> {
        self.capture_event(Event::from_error(error, capture_stacktrace()))
    }

    pub fn capture_message(&self, message: &str, level: Level) -> Option<Response> {
        self.capture_event(Event::message(message, level))
    }

    pub fn close(&self, timeout: Option<Duration>) -> bool {
        self.transport.close(timeout)
    }

    /**
     * Applies option defaults, then the `before_send` hook.
     *
     * Fields already set on the event are kept. A panicking hook is
     * ignored and the event is sent as it was before the hook ran.
     */
    fn prepare_event(&self, mut event: Event) -> Option<Event> {
        let options = &self.options;

        if event.release.is_none() {
            event.release = options.release.clone();
        }
        if event.environment.is_none() {
            event.environment = options.environment.clone();
        }
        if event.server_name.is_none() {
            event.server_name = options.server_name.clone();
        }
        if event.logger.is_none() {
            event.logger = Some(options.logger.clone());
        }

        let Some(callback) = &options.before_send else {
            return Some(event);
        };

        let original = event.clone();
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(None) => {
                debug!(event_id = %original.event_id.simple(), "event dropped by before_send");
                None
            }
            Ok(Some(modified)) => Some(modified),
            Err(_) => {
                warn!(
                    logger = %options.logger,
                    "before_send panicked, sending original event unchanged"
                );
                Some(original)
            }
        }
    }
}
