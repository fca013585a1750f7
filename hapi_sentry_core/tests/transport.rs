//! End-to-end transport tests against a local mock backend.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::read::GzDecoder;
use hapi_sentry_core::{
    CheckIn, CheckInStatus, DeliveryOutcome, Event, HttpTransport, Level, Options,
    ResponseStatus, Transport,
};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(server: &MockServer) -> Options {
    let address = server.address();
    Options {
        dsn: Some(
            format!("http://public@{}:{}/1", address.ip(), address.port())
                .parse()
                .unwrap(),
        ),
        send_attempts: 0,
        retry_delay: Duration::ZERO,
        enable_compression: false,
        ..Default::default()
    }
}

fn accepted() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"id": "4f1f0a4e"}))
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MockMakeWriter {
    output: Arc<Mutex<Vec<u8>>>,
}

impl MockMakeWriter {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
    }
}

impl<'a> MakeWriter<'a> for MockMakeWriter {
    type Writer = MockWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MockWriter {
            output: self.output.clone(),
        }
    }
}

struct MockWriter {
    output: Arc<Mutex<Vec<u8>>>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs() -> (MockMakeWriter, tracing::subscriber::DefaultGuard) {
    let writer = MockMakeWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (writer, guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_error_event_is_posted_to_store_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/1/store/"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-sentry-auth"))
        .and(header_exists("user-agent"))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    let event = Event::message("database unreachable", Level::Error);

    let response = transport.send(&event).unwrap();
    assert_eq!(response.status, ResponseStatus::Accepted);

    let outcome = response.dispatch.unwrap().outcome().await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::Confirmed {
            id: "4f1f0a4e".into()
        }
    );

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["message"], "database unreachable");
    assert_eq!(body["event_id"], event.event_id.simple().to_string());
}

#[tokio::test]
async fn test_check_in_is_posted_as_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/1/envelope/"))
        .and(header("content-type", "application/x-sentry-envelope"))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    let event = Event::check_in(CheckIn::new("nightly-backup", CheckInStatus::Ok));

    let outcome = transport
        .send(&event)
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert!(outcome.is_confirmed());

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let item_header: serde_json::Value =
        serde_json::from_str(body.lines().nth(1).unwrap()).unwrap();
    assert_eq!(item_header["type"], "check_in");
}

#[tokio::test]
async fn test_send_returns_before_the_reply_arrives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted().set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    let response = transport
        .send(&Event::message("slow backend", Level::Error))
        .unwrap();

    let handle = response.dispatch.unwrap();
    assert!(!handle.is_finished());
    assert!(handle.outcome().await.unwrap().is_confirmed());
}

#[tokio::test]
async fn test_empty_id_is_logged_not_raised() {
    let (logs, _guard) = capture_logs();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": ""})))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Options {
        logger: "payments".into(),
        ..options(&server)
    })
    .unwrap();

    let outcome = transport
        .send(&Event::message("boom", Level::Error))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        DeliveryOutcome::Unacknowledged { status: 200, .. }
    ));
    let output = logs.contents();
    assert!(output.contains("sentry sending requests error"), "{output}");
    assert!(output.contains(r#"{"id":""}"#), "{output}");
    assert!(output.contains("logger=payments"), "{output}");
}

#[tokio::test]
async fn test_429_pauses_the_category() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();

    let first = transport
        .send(&Event::message("first", Level::Error))
        .unwrap();
    let outcome = first.dispatch.unwrap().outcome().await.unwrap();
    assert!(matches!(
        outcome,
        DeliveryOutcome::Unacknowledged { status: 429, .. }
    ));

    let second = transport
        .send(&Event::message("second", Level::Error))
        .unwrap();
    assert_eq!(second.status, ResponseStatus::RateLimited);
    assert!(second.dispatch.is_none());
}

#[tokio::test]
async fn test_rate_limited_send_is_logged_and_skips_network() {
    let (logs, _guard) = capture_logs();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted())
        .expect(0)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Options {
        logger: "payments".into(),
        ..options(&server)
    })
    .unwrap();
    transport
        .rate_limiter()
        .limit("error", Duration::from_secs(60));
    let event = Event::message("boom", Level::Error);

    let response = transport.send(&event).unwrap();

    assert_eq!(response.status, ResponseStatus::RateLimited);
    assert!(response.dispatch.is_none());
    let output = logs.contents();
    assert!(output.contains("event has been rate limited"), "{output}");
    assert!(
        output.contains(&event.event_id.simple().to_string()),
        "{output}"
    );
    assert!(output.contains("logger=payments"), "{output}");
}

#[tokio::test]
async fn test_huge_retry_after_is_reported_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("retry-after", "18446744073709551615"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    let reports = transport.delivery_reports();

    let outcome = transport
        .send(&Event::message("boom", Level::Error))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .expect("dispatch task must not panic");

    assert!(matches!(
        outcome,
        DeliveryOutcome::Unacknowledged { status: 429, .. }
    ));
    assert_eq!(reports.try_recv().unwrap().outcome, outcome);
    assert!(transport.rate_limiter().is_category_limited("error"));
}

#[tokio::test]
async fn test_server_error_rate_limits_are_applied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).insert_header("x-sentry-rate-limits", "60::organization"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    let outcome = transport
        .send(&Event::message("boom", Level::Error))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
    let next = transport.send(&Event::message("again", Level::Error)).unwrap();
    assert_eq!(next.status, ResponseStatus::RateLimited);
}

#[tokio::test]
async fn test_sentry_rate_limits_header_is_scoped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted().insert_header("x-sentry-rate-limits", "120:transaction:key"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(options(&server)).unwrap();
    transport
        .send(&Event::message("boom", Level::Error))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let limited = transport.send(&Event::transaction("GET /")).unwrap();
    assert_eq!(limited.status, ResponseStatus::RateLimited);

    let allowed = transport.send(&Event::message("again", Level::Error)).unwrap();
    assert_eq!(allowed.status, ResponseStatus::Accepted);
}

#[tokio::test]
async fn test_server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Options {
        send_attempts: 2,
        ..options(&server)
    })
    .unwrap();
    let reports = transport.delivery_reports();
    let event = Event::message("boom", Level::Error);

    let outcome = transport
        .send(&event)
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
    let report = reports.try_recv().unwrap();
    assert_eq!(report.event_id, event.event_id);
    assert_eq!(report.outcome, outcome);
}

#[tokio::test]
async fn test_compressed_body_is_gzip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-encoding", "gzip"))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Options {
        enable_compression: true,
        ..options(&server)
    })
    .unwrap();

    transport
        .send(&Event::message("compressed", Level::Warning))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let mut decoded = String::new();
    GzDecoder::new(requests[0].body.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(body["message"], "compressed");
    assert_eq!(body["level"], "warning");
}

#[tokio::test]
async fn test_unreachable_backend_never_panics() {
    let transport = HttpTransport::new(Options {
        dsn: Some("http://public@127.0.0.1:1/1".parse().unwrap()),
        send_attempts: 1,
        retry_delay: Duration::ZERO,
        http_connect_timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .unwrap();

    let outcome = transport
        .send(&Event::message("nobody listens", Level::Error))
        .unwrap()
        .dispatch
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
}
