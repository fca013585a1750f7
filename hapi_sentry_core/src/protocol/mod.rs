/*!
 * Protocol layer: what we send to the backend.
 *
 * - `types`: event model (events, exceptions, frames, check-ins)
 * - `dsn`: DSN parsing, endpoint URLs, auth header
 * - `serializer`: JSON and envelope payloads
 * - `stacktrace`: backtrace capture
 * - `constants`: SDK identity and content types
 */

pub mod constants;
pub mod dsn;
pub mod serializer;
pub mod stacktrace;
pub mod types;
