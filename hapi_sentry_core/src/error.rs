//! Error types for the transport.

use thiserror::Error;

use crate::protocol::dsn::DsnError;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while building or delivering a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No DSN configured. Raised synchronously from `send`.
    #[error("the DSN option must be set to use the HTTP transport")]
    MissingDsn,

    #[error("invalid DSN: {0}")]
    InvalidDsn(#[from] DsnError),

    /// The HTTP client failed before a reply was received.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a 5xx status.
    #[error("server error (status {status}): {body}")]
    ServerError { status: u16, body: String },

    /// The backend answered with a 4xx status and client errors are
    /// classified as failures.
    #[error("client error (status {status}): {body}")]
    ClientError { status: u16, body: String },

    /// Compressing a request or decoding a reply failed.
    #[error("I/O error while encoding payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The dedicated dispatch runtime could not be started.
    #[error("failed to start dispatch runtime: {0}")]
    Runtime(String),
}
