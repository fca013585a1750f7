/**
 * SDK-wide constants.
 *
 * These values identify this adapter to the Sentry backend, both in the
 * `User-Agent` / `X-Sentry-Auth` headers and in the `sdk` block of every
 * event payload.
 */

/// SDK identifier reported to the backend.
pub const SDK_NAME: &str = "sentry.rust.hapi";

/// SDK version, taken from the `hapi_sentry_core` package version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version sent in the `X-Sentry-Auth` header.
pub const PROTOCOL_VERSION: u8 = 7;

/// Name of the authentication header understood by the backend.
pub const AUTH_HEADER: &str = "x-sentry-auth";

/// Content type of single-event payloads posted to the store endpoint.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of envelope payloads posted to the envelope endpoint.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";

/// Platform reported in every event.
pub const PLATFORM: &str = "rust";

/// `<sdk-name>/<sdk-version>`, used as the `User-Agent` and `sentry_client` value.
pub fn user_agent() -> String {
    format!("{SDK_NAME}/{SDK_VERSION}")
}
