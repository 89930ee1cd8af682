//! Error types for the gateway binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] database::DatabaseError),

    #[error("Backend error: {0}")]
    Backend(#[from] node_core::BackendError),

    #[error("Nostr error: {0}")]
    Nostr(#[from] nip47::Error),

    #[error("Service configuration error: {0}")]
    Service(#[from] wallet_service::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
