//! Configuration for the phoenixd backend.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Connection settings for a phoenixd instance.
#[derive(Clone)]
pub struct PhoenixdConfig {
    /// Base URL, e.g. `http://localhost:9740`.
    pub url: String,
    /// HTTP password from phoenixd's `phoenix.conf`.
    pub password: String,
    pub http_timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl PhoenixdConfig {
    pub fn new(url: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            password: password.into(),
            http_timeout_secs: 60,
            accept_invalid_certs: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Expects:
    /// - `PHOENIXD_URL` - The phoenixd server URL
    /// - `PHOENIXD_PASSWORD` - The phoenixd HTTP password
    /// - `PHOENIXD_HTTP_TIMEOUT_SECS` - Optional request timeout (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("PHOENIXD_URL").map_err(|_| ConfigError::MissingVar("PHOENIXD_URL"))?;
        let password = std::env::var("PHOENIXD_PASSWORD")
            .map_err(|_| ConfigError::MissingVar("PHOENIXD_PASSWORD"))?;

        let mut config = Self::new(url, password);
        if let Ok(value) = std::env::var("PHOENIXD_HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs = value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PHOENIXD_HTTP_TIMEOUT_SECS",
                value,
            })?;
        }
        config.accept_invalid_certs = std::env::var("PHOENIXD_ACCEPT_INVALID_CERTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Ok(config)
    }
}

impl std::fmt::Debug for PhoenixdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixdConfig")
            .field("url", &self.url)
            .field("password", &"<redacted>")
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}
