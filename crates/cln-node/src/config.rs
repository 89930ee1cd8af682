//! Configuration for the CLN backend.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),
}

/// Connection settings for a clnrest endpoint.
#[derive(Clone)]
pub struct ClnConfig {
    /// Base URL, e.g. `https://localhost:3010`.
    pub url: String,
    /// Rune with permission for the methods the gateway calls.
    pub rune: String,
    pub http_timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl ClnConfig {
    pub fn new(url: impl Into<String>, rune: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            rune: rune.into(),
            http_timeout_secs: 60,
            // clnrest ships with a self-signed certificate.
            accept_invalid_certs: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Expects:
    /// - `CLN_REST_URL` - The clnrest URL
    /// - `CLN_RUNE` - The rune
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("CLN_REST_URL").map_err(|_| ConfigError::MissingVar("CLN_REST_URL"))?;
        let rune = std::env::var("CLN_RUNE").map_err(|_| ConfigError::MissingVar("CLN_RUNE"))?;
        Ok(Self::new(url, rune))
    }
}

impl std::fmt::Debug for ClnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClnConfig")
            .field("url", &self.url)
            .field("rune", &"<redacted>")
            .finish()
    }
}
