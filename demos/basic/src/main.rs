/*!
 * Minimal harness for the hapi_sentry SDK.
 *
 * Set `SENTRY_DSN` (or pass a TOML config file) and run:
 *
 *   cargo run -p hapi_sentry_demo
 *   cargo run -p hapi_sentry_demo -- sentry.toml
 *   cargo run -p hapi_sentry_demo -- --panic        # test panic capture
 *
 * Log verbosity follows `RUST_LOG` (default `info`).
 */
use std::time::Duration;

use hapi_sentry::{DeliveryOutcome, Level, SentryConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let test_panic = args.iter().any(|a| a == "--panic");

    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => match SentryConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "could not load config");
                return;
            }
        },
        None => SentryConfig::from(std::env::var("SENTRY_DSN").unwrap_or_default().as_str()),
    };

    match hapi_sentry::init(config) {
        Ok(true) => info!("reporting enabled"),
        Ok(false) => info!("no DSN configured, events are discarded"),
        Err(err) => {
            error!(error = %err, "invalid sentry configuration");
            return;
        }
    }

    hapi_sentry::capture_message("Hello from hapi_sentry!", Level::Info);

    /*
     * Report a real error and wait for the backend's verdict. `send` itself
     * returned long before the reply; the handle is the only way to see it.
     */
    let err = match std::fs::read_to_string("/nonexistent/path.txt") {
        Ok(_) => return,
        Err(err) => err,
    };

    let dispatch = hapi_sentry::capture_exception(&err).and_then(|response| {
        info!(event_id = %response.event_id.simple(), status = ?response.status, "captured io error");
        response.dispatch
    });

    if let Some(handle) = dispatch {
        match tokio::time::timeout(Duration::from_secs(10), handle.outcome()).await {
            Ok(Some(DeliveryOutcome::Confirmed { id })) => info!(id, "event confirmed"),
            Ok(Some(outcome)) => info!(?outcome, "event not confirmed"),
            Ok(None) => info!("dispatch task was cancelled"),
            Err(_) => info!("no reply within 10s"),
        }
    }

    if test_panic {
        info!("triggering a panic");
        panic!("Test panic from hapi_sentry demo");
    }
}
