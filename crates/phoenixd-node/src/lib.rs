//! phoenixd backend.
//!
//! Talks to phoenixd's HTTP API with basic auth. phoenixd manages a single
//! channel with its LSP on its own, so `connect_peer` is not supported.
//!
//! ```no_run
//! use phoenixd_node::{PhoenixdConfig, PhoenixdNode};
//! use node_core::NodeBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let node = PhoenixdNode::new(PhoenixdConfig::from_env()?)?;
//! println!("balance: {} msat", node.get_balance().await?);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod types;

pub use client::PhoenixdNode;
pub use config::{ConfigError, PhoenixdConfig};
