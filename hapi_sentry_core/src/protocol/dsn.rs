/**
 * DSN parsing and endpoint derivation.
 *
 * A DSN identifies both the destination and the credentials of a project:
 *
 * ```text
 * {scheme}://{public_key}[:{secret_key}]@{host}[:{port}]/[{path}/]{project_id}
 * ```
 *
 * From a parsed DSN we derive the two API endpoints the transport posts to
 * (store and envelope) and the value of the `X-Sentry-Auth` header.
 */
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use super::constants::PROTOCOL_VERSION;

// ---------------------------------------------------------------------------
// DsnError
// ---------------------------------------------------------------------------

/// Reasons a DSN string can be rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DsnError {
    #[error("DSN is not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported DSN scheme \"{0}\", expected http or https")]
    UnsupportedScheme(String),

    #[error("DSN is missing the public key")]
    MissingPublicKey,

    #[error("DSN is missing the host")]
    MissingHost,

    #[error("DSN is missing the project id")]
    MissingProjectId,
}

// ---------------------------------------------------------------------------
// Dsn
// ---------------------------------------------------------------------------

/**
 * A parsed Data Source Name.
 *
 * Immutable after parsing. `Display` renders it back into its canonical
 * string form, which is also what goes into the envelope header.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    scheme: String,
    public_key: String,
    secret_key: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    project_id: String,
}

impl Dsn {
    /**
     * Parses a DSN string.
     *
     * # Errors
     * Returns a `DsnError` when the string is not a URL, uses a scheme other
     * than `http`/`https`, or lacks a public key, host or project id.
     */
    pub fn parse(raw: &str) -> Result<Self, DsnError> {
        let url = Url::parse(raw.trim()).map_err(|e| DsnError::InvalidUrl(e.to_string()))?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(DsnError::UnsupportedScheme(scheme));
        }

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(DsnError::MissingPublicKey);
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(DsnError::MissingHost),
        };

        /*
         * The last path segment is the project id, everything before it is
         * a path prefix for installations served below the domain root.
         */
        let trimmed = url.path().trim_end_matches('/');
        let (prefix, project_id) = match trimmed.rfind('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };
        if project_id.is_empty() {
            return Err(DsnError::MissingProjectId);
        }

        Ok(Self {
            scheme,
            public_key,
            secret_key: url.password().filter(|s| !s.is_empty()).map(str::to_string),
            host,
            port: url.port(),
            path: prefix.to_string(),
            project_id: project_id.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Legacy single-event endpoint: `.../api/{project_id}/store/`.
    pub fn store_api_url(&self) -> String {
        format!("{}/api/{}/store/", self.base_url(), self.project_id)
    }

    /// Multi-item endpoint: `.../api/{project_id}/envelope/`.
    pub fn envelope_api_url(&self) -> String {
        format!("{}/api/{}/envelope/", self.base_url(), self.project_id)
    }

    /**
     * Builds the `X-Sentry-Auth` header value for this DSN.
     *
     * # Arguments
     * * `client`: `<sdk-name>/<sdk-version>` of the reporting SDK.
     */
    pub fn auth_header(&self, client: &str) -> String {
        let mut value = format!(
            "Sentry sentry_version={PROTOCOL_VERSION}, sentry_client={client}, sentry_key={}",
            self.public_key
        );
        if let Some(secret) = &self.secret_key {
            value.push_str(", sentry_secret=");
            value.push_str(secret);
        }
        value
    }

    fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.path),
            None => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }
}

impl FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.public_key)?;
        if let Some(secret) = &self.secret_key {
            write!(f, ":{secret}")?;
        }
        write!(f, "@{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}/{}", self.path, self.project_id)
    }
}
