//! Core Lightning backend over clnrest.
//!
//! Every call is `POST /v1/<method>` with a JSON body and the rune in the
//! `Rune` header.

mod client;
mod config;
mod types;

pub use client::ClnNode;
pub use config::{ClnConfig, ConfigError};
