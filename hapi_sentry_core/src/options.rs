/**
 * Client and transport configuration.
 *
 * `Options` is a read-only snapshot: transports and clients hold it behind
 * an `Arc` for their whole lifetime. All fields have sensible defaults via
 * `Default`.
 *
 * # Example
 * ```ignore
 * let options = hapi_sentry_core::Options {
 *     dsn: Some("https://key@o1.ingest.example.com/1".parse()?),
 *     environment: Some("production".into()),
 *     ..Default::default()
 * };
 * ```
 */
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::dsn::{Dsn, DsnError};
use crate::protocol::serializer;
use crate::protocol::types::{Event, EventKind};

/// Hook run on every event before it reaches the transport.
///
/// Return `None` to drop the event, or `Some(event)` to send it (possibly
/// modified).
pub type BeforeSend = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Retries after the first attempt when the backend is unreachable.
const DEFAULT_SEND_ATTEMPTS: u32 = 3;

/// Capacity of the delivery-report channel; reports beyond it are dropped.
const DEFAULT_REPORT_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct Options {
    /// Destination and credentials. `None` disables the HTTP transport.
    pub dsn: Option<Dsn>,

    /// Logger channel name, attached to every log record the transport emits.
    /// Default: `"default"`.
    pub logger: String,

    /// How many times a failed request is retried.
    /// Default: `3`.
    pub send_attempts: u32,

    /// Delay before the first retry; doubles on every further retry.
    /// Default: 500 ms. `Duration::ZERO` retries immediately.
    pub retry_delay: Duration,

    /// Gzip request bodies and decode compressed replies.
    /// Default: `true`.
    pub enable_compression: bool,

    /// Explicit tracing switch. `None` means "enabled iff a
    /// `traces_sample_rate` is set".
    pub enable_tracing: Option<bool>,

    pub traces_sample_rate: Option<f64>,

    pub release: Option<String>,
    pub environment: Option<String>,
    pub server_name: Option<String>,

    /// Whole-request timeout. Default: 5 s.
    pub http_timeout: Duration,

    /// Connect timeout. Default: 2 s.
    pub http_connect_timeout: Duration,

    /// Capacity of the delivery-report channel.
    /// Default: `100`.
    pub report_capacity: usize,

    /// Optional callback invoked before each event is sent.
    ///
    /// If the callback panics, the original event is sent unchanged and a
    /// warning is logged.
    pub before_send: Option<BeforeSend>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dsn: None,
            logger: "default".to_string(),
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            retry_delay: Duration::from_millis(500),
            enable_compression: true,
            enable_tracing: None,
            traces_sample_rate: None,
            release: None,
            environment: None,
            server_name: None,
            http_timeout: Duration::from_secs(5),
            http_connect_timeout: Duration::from_secs(2),
            report_capacity: DEFAULT_REPORT_CAPACITY,
            before_send: None,
        }
    }
}

impl Options {
    /// Default options pointing at `dsn`.
    pub fn with_dsn(dsn: &str) -> Result<Self, DsnError> {
        Ok(Self {
            dsn: Some(Dsn::parse(dsn)?),
            ..Default::default()
        })
    }

    pub fn is_tracing_enabled(&self) -> bool {
        match self.enable_tracing {
            Some(enabled) => enabled,
            None => self.traces_sample_rate.is_some(),
        }
    }

    /// True when events of `kind` are posted to the envelope endpoint.
    pub fn uses_envelope(&self, kind: EventKind) -> bool {
        serializer::uses_envelope(self.is_tracing_enabled(), kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(options.dsn.is_none());
        assert_eq!(options.logger, "default");
        assert_eq!(options.send_attempts, 3);
        assert!(options.enable_compression);
        assert!(!options.is_tracing_enabled());
    }

    #[test]
    fn test_tracing_enabled_by_sample_rate() {
        let options = Options {
            traces_sample_rate: Some(0.2),
            ..Default::default()
        };
        assert!(options.is_tracing_enabled());
        assert!(options.uses_envelope(EventKind::Error));
    }

    #[test]
    fn test_explicit_switch_wins_over_sample_rate() {
        let options = Options {
            enable_tracing: Some(false),
            traces_sample_rate: Some(1.0),
            ..Default::default()
        };
        assert!(!options.is_tracing_enabled());
        assert!(!options.uses_envelope(EventKind::Error));
        assert!(options.uses_envelope(EventKind::CheckIn));
    }

    #[test]
    fn test_with_dsn_rejects_garbage() {
        assert!(Options::with_dsn("https://key@host/1").is_ok());
        assert!(Options::with_dsn("garbage").is_err());
    }
}
