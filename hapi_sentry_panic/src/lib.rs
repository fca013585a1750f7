/*!
 * Panic hook: reports panics as fatal events.
 *
 * `install()` registers a `std::panic::set_hook` handler. When a panic
 * occurs, it:
 *
 * 1. Extracts the panic message, source location and thread name.
 * 2. Captures a backtrace at the panic site.
 * 3. Builds a fatal `Event` with an unhandled `panic` mechanism and sends
 *    it through the registry's client.
 * 4. Calls the previous panic hook, so the default stderr output stays.
 *
 * Sending only schedules a dispatch task; the hook never waits for the
 * network. If the process aborts right after the panic, the event may be
 * lost.
 *
 * # Recursion safety
 *
 * A `thread_local` flag stops the hook from re-entering itself if the
 * reporting path panics.
 */

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, Location, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};

use hapi_sentry_core::{
    convert_backtrace, Event, EventKind, Exception, ExceptionList, Level, Mechanism, Registry,
    Stacktrace,
};
use tracing::debug;

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Keeps `install()` idempotent so hooks never stack.
static INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/**
 * Installs the panic hook on the process-default registry.
 *
 * Idempotent: subsequent calls are silent no-ops. Panics that happen
 * before a client is bound are not reported.
 */
pub fn install() {
    install_with(Registry::global());
}

/**
 * Installs the panic hook, reporting through `registry`.
 *
 * # Returns
 * `false` if a hook from this crate was already installed.
 */
pub fn install_with(registry: &'static Registry) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let is_recursive = IN_HOOK.with(|flag| flag.replace(true));

        if !is_recursive {
            let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                handle_panic(registry, info);
            }));

            IN_HOOK.with(|flag| flag.set(false));
        }

        previous_hook(info);
    }));

    true
}

// ---------------------------------------------------------------------------
// Event construction
// ---------------------------------------------------------------------------

/// Panic message from a payload; `&str` and `String` payloads are supported.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    match payload.downcast_ref::<String>() {
        Some(s) => s.clone(),
        None => "Box<dyn Any>".to_string(),
    }
}

/**
 * Builds the fatal event reported for a panic.
 *
 * # Arguments
 * * `message`: the panic payload rendered as text.
 * * `location`: where the panic was raised, if known.
 * * `thread`: name of the panicking thread.
 * * `stacktrace`: frames captured at the panic site.
 */
pub fn panic_event(
    message: &str,
    location: Option<&Location<'_>>,
    thread: &str,
    stacktrace: Option<Stacktrace>,
) -> Event {
    let mut event = Event::new(EventKind::Error);
    event.level = Level::Fatal;
    event.exception = ExceptionList {
        values: vec![Exception {
            exception_type: "panic".to_string(),
            value: message.to_string(),
            stacktrace,
            mechanism: Some(Mechanism {
                mechanism_type: "panic".to_string(),
                handled: false,
            }),
        }],
    };
    event.tags.insert("thread".to_string(), thread.to_string());

    if let Some(location) = location {
        event.extra.insert(
            "location".to_string(),
            format!("{}:{}:{}", location.file(), location.line(), location.column()).into(),
        );
    }

    event
}

fn handle_panic(registry: &Registry, info: &PanicHookInfo<'_>) {
    let Some(client) = registry.client() else {
        return;
    };

    let message = panic_message(info.payload());
    let current = std::thread::current();
    let thread = current.name().unwrap_or("<unnamed>");

    let bt = backtrace::Backtrace::new();
    let stacktrace = convert_backtrace(&bt);
    let stacktrace = (!stacktrace.frames.is_empty()).then_some(stacktrace);

    let event = panic_event(&message, info.location(), thread, stacktrace);
    debug!(event_id = %event.event_id.simple(), thread, "reporting panic");
    client.capture_event(event);
}
