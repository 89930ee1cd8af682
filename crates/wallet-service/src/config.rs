//! Engine tuning knobs.

use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 50;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;
const DEFAULT_OUTBOUND_QUEUE: usize = 256;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_PUBLISH_RETRY_SECS: u64 = 15;
const DEFAULT_INVOICE_EXPIRY_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deadline for every node backend call.
    pub backend_timeout: Duration,
    /// Requests processed at the same time.
    pub max_concurrent_requests: usize,
    /// Capacity of the channel between handlers and the publisher.
    pub outbound_queue: usize,
    /// Period of the pending-transaction sweep.
    pub reconcile_interval: Duration,
    /// Period of the outbox redelivery pass.
    pub publish_retry_interval: Duration,
    /// Expiry for `make_invoice` when the app sends none.
    pub default_invoice_expiry_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            publish_retry_interval: Duration::from_secs(DEFAULT_PUBLISH_RETRY_SECS),
            default_invoice_expiry_secs: DEFAULT_INVOICE_EXPIRY_SECS,
        }
    }
}

impl ServiceConfig {
    /// Read overrides from `NWC_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            backend_timeout: Duration::from_secs(parse_env(
                "NWC_BACKEND_TIMEOUT_SECS",
                DEFAULT_BACKEND_TIMEOUT_SECS,
            )?),
            max_concurrent_requests: parse_env(
                "NWC_MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?
            .max(1),
            outbound_queue: parse_env("NWC_OUTBOUND_QUEUE", defaults.outbound_queue)?.max(1),
            reconcile_interval: Duration::from_secs(
                parse_env("NWC_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?.max(1),
            ),
            publish_retry_interval: Duration::from_secs(
                parse_env("NWC_PUBLISH_RETRY_SECS", DEFAULT_PUBLISH_RETRY_SECS)?.max(1),
            ),
            default_invoice_expiry_secs: parse_env(
                "NWC_INVOICE_EXPIRY_SECS",
                defaults.default_invoice_expiry_secs,
            )?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
