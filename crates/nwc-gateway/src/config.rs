//! Configuration loaded from environment variables.

use std::env;
use std::path::Path;
use std::sync::Arc;

use cln_node::{ClnConfig, ClnNode};
use mock_node::MockNode;
use node_core::NodeBackend;
use phoenixd_node::{PhoenixdConfig, PhoenixdNode};

use crate::error::GatewayError;

const DEFAULT_SQLITE_PATH: &str = "./data/nwc.db";

/// Which Lightning node the gateway drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Phoenixd,
    Cln,
    /// In-memory node, for local testing only.
    Mock,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self, GatewayError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "phoenixd" => Ok(BackendKind::Phoenixd),
            "cln" | "clnrest" => Ok(BackendKind::Cln),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(GatewayError::Config(format!(
                "unknown LN_BACKEND_TYPE: {value}"
            ))),
        }
    }

    /// Build the backend from its own environment variables.
    pub fn connect(self) -> Result<Arc<dyn NodeBackend>, GatewayError> {
        let backend: Arc<dyn NodeBackend> = match self {
            BackendKind::Phoenixd => {
                let config = PhoenixdConfig::from_env()
                    .map_err(|e| GatewayError::Config(e.to_string()))?;
                Arc::new(PhoenixdNode::new(config)?)
            }
            BackendKind::Cln => {
                let config =
                    ClnConfig::from_env().map_err(|e| GatewayError::Config(e.to_string()))?;
                Arc::new(ClnNode::new(config)?)
            }
            BackendKind::Mock => Arc::new(MockNode::new()),
        };
        Ok(backend)
    }
}

/// Gateway-level settings. Relay and engine settings load separately.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// SQLx SQLite URL.
    pub database_url: String,
    pub backend: BackendKind,
}

impl GatewayConfig {
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SQLITE_PATH` | Ledger path or `sqlite:` URL | `./data/nwc.db` |
    /// | `LN_BACKEND_TYPE` | `phoenixd`, `cln` or `mock` | (required) |
    pub fn from_env() -> Result<Self, GatewayError> {
        let database_url = database_url(
            &env::var("SQLITE_PATH").unwrap_or_else(|_| DEFAULT_SQLITE_PATH.to_string()),
        )?;
        let backend = env::var("LN_BACKEND_TYPE")
            .map_err(|_| GatewayError::Config("LN_BACKEND_TYPE is required".to_string()))
            .and_then(|value| BackendKind::parse(&value))?;

        Ok(Self {
            database_url,
            backend,
        })
    }

    /// Only the database is needed for app management.
    pub fn database_url_from_env() -> Result<String, GatewayError> {
        database_url(&env::var("SQLITE_PATH").unwrap_or_else(|_| DEFAULT_SQLITE_PATH.to_string()))
    }
}

/// Turn a plain path into a create-if-missing SQLite URL, creating its
/// parent directory.
fn database_url(value: &str) -> Result<String, GatewayError> {
    if value.starts_with("sqlite:") {
        return Ok(value.to_string());
    }
    if let Some(parent) = Path::new(value).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(format!("sqlite:{value}?mode=rwc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind() {
        assert_eq!(BackendKind::parse("phoenixd").unwrap(), BackendKind::Phoenixd);
        assert_eq!(BackendKind::parse(" CLN ").unwrap(), BackendKind::Cln);
        assert_eq!(BackendKind::parse("mock").unwrap(), BackendKind::Mock);
        assert!(BackendKind::parse("lnd").is_err());
    }

    #[test]
    fn test_database_url() {
        assert_eq!(
            database_url("sqlite::memory:").unwrap(),
            "sqlite::memory:"
        );
        assert_eq!(database_url("nwc.db").unwrap(), "sqlite:nwc.db?mode=rwc");
    }
}
