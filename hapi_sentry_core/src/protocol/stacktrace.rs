/**
 * Stack trace capture via the `backtrace` crate.
 */
use super::types::{Frame, Stacktrace};

/**
 * Captures a stack trace at the current call site.
 * Returns `None` if no useful frames were resolved.
 */
pub fn capture_stacktrace() -> Option<Stacktrace> {
    let bt = backtrace::Backtrace::new();
    let stacktrace = convert_backtrace(&bt);
    if stacktrace.frames.is_empty() {
        None
    } else {
        Some(stacktrace)
    }
}

/**
 * Converts a resolved `backtrace::Backtrace` into a `Stacktrace`.
 *
 * Frames with neither a function name nor a file are dropped. The
 * backtrace lists the innermost call first; the backend wants the
 * oldest frame first, so the result is reversed.
 */
pub fn convert_backtrace(bt: &backtrace::Backtrace) -> Stacktrace {
    let mut frames = Vec::new();

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            let function = symbol.name().map(|n| n.to_string());
            let filename = symbol.filename().map(|p| p.display().to_string());

            if function.is_none() && filename.is_none() {
                continue;
            }

            frames.push(Frame {
                function,
                filename,
                lineno: symbol.lineno(),
                colno: symbol.colno(),
            });
        }
    }

    frames.reverse();
    Stacktrace { frames }
}
