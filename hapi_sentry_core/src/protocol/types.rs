/**
 * Event model sent to the Sentry backend.
 *
 * `Event` is what callers hand to a transport. It serializes to the JSON
 * shape expected by the store endpoint; for transactions and check-ins the
 * serializer wraps it (or its `CheckIn` payload) in an envelope instead.
 *
 * Once handed to `Transport::send` an event is only ever borrowed.
 */
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::constants::{PLATFORM, SDK_NAME, SDK_VERSION};

// ---------------------------------------------------------------------------
// EventKind / Level
// ---------------------------------------------------------------------------

/// What an event describes. Drives endpoint selection and rate-limit category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Error,
    Transaction,
    CheckIn,
}

impl EventKind {
    /// Item type used in the envelope item header.
    pub fn item_type(self) -> &'static str {
        match self {
            EventKind::Error => "event",
            EventKind::Transaction => "transaction",
            EventKind::CheckIn => "check_in",
        }
    }

    /// Rate-limiting category the backend uses for this kind.
    pub fn category(self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::Transaction => "transaction",
            EventKind::CheckIn => "monitor",
        }
    }

    fn is_error(&self) -> bool {
        *self == EventKind::Error
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.item_type())
    }
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

// ---------------------------------------------------------------------------
// Exceptions and stack traces
// ---------------------------------------------------------------------------

/// A single stack frame, oldest frames first within a `Stacktrace`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stacktrace {
    pub frames: Vec<Frame>,
}

/// How an exception was captured (`"generic"`, `"panic"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mechanism {
    #[serde(rename = "type")]
    pub mechanism_type: String,
    pub handled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exception {
    #[serde(rename = "type")]
    pub exception_type: String,

    pub value: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionList {
    pub values: Vec<Exception>,
}

impl ExceptionList {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Check-ins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    InProgress,
    Ok,
    Error,
}

/// Cron-monitor check-in, sent as its own envelope item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckIn {
    #[serde(serialize_with = "serialize_simple_uuid")]
    pub check_in_id: Uuid,

    pub monitor_slug: String,

    pub status: CheckInStatus,

    /// Duration of the monitored job in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl CheckIn {
    pub fn new(monitor_slug: impl Into<String>, status: CheckInStatus) -> Self {
        Self {
            check_in_id: Uuid::new_v4(),
            monitor_slug: monitor_slug.into(),
            status,
            duration: None,
            release: None,
            environment: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SdkInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            name: SDK_NAME.to_string(),
            version: SDK_VERSION.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/**
 * An error, transaction or check-in ready to be reported.
 *
 * Construct with `Event::new`, `Event::from_error`, `Event::message`,
 * `Event::transaction` or `Event::check_in`, then adjust the public fields.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(serialize_with = "serialize_simple_uuid")]
    pub event_id: Uuid,

    /// Only serialized for non-error kinds (`"type": "transaction"`).
    #[serde(rename = "type", skip_serializing_if = "EventKind::is_error")]
    pub kind: EventKind,

    pub timestamp: DateTime<Utc>,

    pub platform: String,

    pub level: Level,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(skip_serializing_if = "ExceptionList::is_empty")]
    pub exception: ExceptionList,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,

    pub sdk: SdkInfo,

    /// Payload of a `CheckIn` event; serialized by the envelope writer.
    #[serde(skip)]
    pub check_in: Option<CheckIn>,
}

impl Event {
    /// Creates an empty event of the given kind with a fresh id.
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            platform: PLATFORM.to_string(),
            level: match kind {
                EventKind::Error => Level::Error,
                EventKind::Transaction | EventKind::CheckIn => Level::Info,
            },
            message: None,
            logger: None,
            transaction: None,
            release: None,
            environment: None,
            server_name: None,
            exception: ExceptionList::default(),
            tags: BTreeMap::new(),
            extra: BTreeMap::new(),
            sdk: SdkInfo::default(),
            check_in: None,
        }
    }

    /// A plain message event.
    pub fn message(message: impl Into<String>, level: Level) -> Self {
        let mut event = Self::new(EventKind::Error);
        event.message = Some(message.into());
        event.level = level;
        event
    }

    /**
     * Builds an error event from an error value and its `source()` chain.
     *
     * The outermost error comes last in `exception.values`, which is the
     * order the backend expects for chained exceptions. The captured
     * stack trace is attached to the outermost error only.
     */
    pub fn from_error<E: std::error::Error + ?Sized>(
        error: &E,
        stacktrace: Option<Stacktrace>,
    ) -> Self {
        let mut values = vec![Exception {
            exception_type: type_from_debug(error),
            value: error.to_string(),
            stacktrace,
            mechanism: Some(Mechanism {
                mechanism_type: "generic".to_string(),
                handled: true,
            }),
        }];

        let mut source = error.source();
        while let Some(inner) = source {
            values.push(Exception {
                exception_type: type_from_debug(inner),
                value: inner.to_string(),
                stacktrace: None,
                mechanism: None,
            });
            source = inner.source();
        }
        values.reverse();

        let mut event = Self::new(EventKind::Error);
        event.exception = ExceptionList { values };
        event
    }

    pub fn transaction(name: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Transaction);
        event.transaction = Some(name.into());
        event
    }

    pub fn check_in(check_in: CheckIn) -> Self {
        let mut event = Self::new(EventKind::CheckIn);
        event.check_in = Some(check_in);
        event
    }
}

/**
 * Derives a type name from an error's `Debug` output: everything up to the
 * first `(`, `{` or space. `io::Error` debug-prints as `Os { .. }` or
 * `Custom { .. }`, so those fall back to `"Error"`.
 */
fn type_from_debug<E: fmt::Debug + ?Sized>(error: &E) -> String {
    let debug = format!("{error:?}");
    let name = debug
        .split(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    match name {
        "" | "Os" | "Custom" | "Simple" | "SimpleMessage" => "Error".to_string(),
        _ if name.starts_with('"') => "Error".to_string(),
        _ => name.to_string(),
    }
}

fn serialize_simple_uuid<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&id.simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer {
        inner: std::io::Error,
    }

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("config could not be loaded")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.inner)
        }
    }

    #[test]
    fn test_error_event_omits_type_field() {
        let event = Event::message("boom", Level::Error);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("type").is_none());
        assert_eq!(json["message"], "boom");
        assert_eq!(json["platform"], "rust");
        assert_eq!(json["sdk"]["name"], SDK_NAME);
    }

    #[test]
    fn test_event_id_is_32_hex_chars() {
        let event = Event::new(EventKind::Error);
        let json = serde_json::to_value(&event).unwrap();
        let id = json["event_id"].as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_transaction_event_carries_type() {
        let event = Event::transaction("GET /users");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transaction");
        assert_eq!(json["transaction"], "GET /users");
        assert_eq!(json["level"], "info");
    }

    #[test]
    fn test_from_error_walks_source_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
        };
        let event = Event::from_error(&err, None);

        let values = &event.exception.values;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value, "missing file");
        assert_eq!(values[0].exception_type, "Error");
        assert_eq!(values[1].exception_type, "Outer");
        assert_eq!(values[1].value, "config could not be loaded");
        assert_eq!(
            values[1].mechanism.as_ref().map(|m| m.handled),
            Some(true)
        );
    }

    #[test]
    fn test_category_per_kind() {
        assert_eq!(EventKind::Error.category(), "error");
        assert_eq!(EventKind::Transaction.category(), "transaction");
        assert_eq!(EventKind::CheckIn.category(), "monitor");
    }

    #[test]
    fn test_check_in_serialization() {
        let mut check_in = CheckIn::new("nightly-backup", CheckInStatus::InProgress);
        check_in.duration = Some(1.5);
        let json = serde_json::to_value(&check_in).unwrap();
        assert_eq!(json["monitor_slug"], "nightly-backup");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["duration"], 1.5);
    }
}
