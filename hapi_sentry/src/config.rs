/*!
 * Service-level configuration bag.
 *
 * Deserialized from TOML (or built in code) and turned into core `Options`.
 * Every key is optional:
 *
 * ```toml
 * dsn = "https://public@o1.ingest.example.com/42"
 * logger = "sentry"
 * environment = "production"
 * release = "api@1.4.0"
 * send_attempts = 3
 * enable_compression = true
 * catch_panics = true
 * ```
 *
 * An empty or missing `dsn` disables reporting.
 */
use std::path::{Path, PathBuf};

use hapi_sentry_core::{Dsn, DsnError, Options};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sentry config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid dsn: {0}")]
    InvalidDsn(#[from] DsnError),

    #[error("failed to start sentry transport: {0}")]
    Transport(#[from] hapi_sentry_core::TransportError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentryConfig {
    pub dsn: Option<String>,

    /// Logger channel the transport's log records are tagged with.
    pub logger: String,

    pub environment: Option<String>,
    pub release: Option<String>,
    pub server_name: Option<String>,

    /// Retries after the first failed attempt.
    pub send_attempts: u32,

    pub enable_compression: bool,
    pub enable_tracing: Option<bool>,
    pub traces_sample_rate: Option<f64>,

    /// Install the panic hook on init.
    pub catch_panics: bool,
}

impl Default for SentryConfig {
    fn default() -> Self {
        let options = Options::default();
        Self {
            dsn: None,
            logger: options.logger,
            environment: None,
            release: None,
            server_name: None,
            send_attempts: options.send_attempts,
            enable_compression: options.enable_compression,
            enable_tracing: None,
            traces_sample_rate: None,
            catch_panics: true,
        }
    }
}

/// `hapi_sentry::init("https://key@host/1")`: a bare DSN with defaults.
impl From<&str> for SentryConfig {
    fn from(dsn: &str) -> Self {
        Self {
            dsn: Some(dsn.to_string()),
            ..Default::default()
        }
    }
}

impl SentryConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// DSN with surrounding whitespace removed, `None` when blank.
    pub fn dsn(&self) -> Option<&str> {
        self.dsn.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.dsn().is_some()
    }

    /**
     * Converts the bag into core options.
     *
     * # Errors
     * `InvalidDsn` if a non-blank DSN does not parse.
     */
    pub fn to_options(&self) -> Result<Options, ConfigError> {
        let dsn = self.dsn().map(Dsn::parse).transpose()?;

        Ok(Options {
            dsn,
            logger: self.logger.clone(),
            environment: self.environment.clone(),
            release: self.release.clone(),
            server_name: self.server_name.clone(),
            send_attempts: self.send_attempts,
            enable_compression: self.enable_compression,
            enable_tracing: self.enable_tracing,
            traces_sample_rate: self.traces_sample_rate,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = SentryConfig::from_toml_str("").unwrap();
        assert_eq!(config, SentryConfig::default());
        assert!(!config.is_enabled());
        assert!(config.catch_panics);
    }

    #[test]
    fn test_full_toml() {
        let config = SentryConfig::from_toml_str(
            r#"
            dsn = "https://public@o1.ingest.example.com/42"
            logger = "sentry"
            environment = "production"
            send_attempts = 5
            enable_compression = false
            traces_sample_rate = 0.25
            catch_panics = false
            "#,
        )
        .unwrap();

        let options = config.to_options().unwrap();
        assert_eq!(options.dsn.as_ref().unwrap().project_id(), "42");
        assert_eq!(options.logger, "sentry");
        assert_eq!(options.environment.as_deref(), Some("production"));
        assert_eq!(options.send_attempts, 5);
        assert!(!options.enable_compression);
        assert!(options.is_tracing_enabled());
        assert!(!config.catch_panics);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = SentryConfig::from_toml_str("dns = \"typo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_blank_dsn_disables() {
        let config = SentryConfig::from("   ");
        assert!(!config.is_enabled());
        assert!(config.to_options().unwrap().dsn.is_none());
    }

    #[test]
    fn test_bad_dsn_is_a_config_error() {
        let err = SentryConfig::from("not a dsn").to_options().err().unwrap();
        assert!(matches!(err, ConfigError::InvalidDsn(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SentryConfig::from_file("/nonexistent/sentry.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
