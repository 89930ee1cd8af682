//! Core trait and types for Lightning node backends.
//!
//! Every node the gateway can drive implements [`NodeBackend`]. The gateway
//! picks one implementation at startup and only ever talks to it through
//! this interface:
//!
//! - [`NodeBackend`] - capability surface (balance, pay, invoice, channels, peers)
//! - [`BackendError`] - failure kinds shared by all backends
//! - [`decode_bolt11`] - payment request parsing
//! - [`with_deadline`] - bound a backend call without cancelling it
//!
//! # Example
//!
//! ```rust
//! use node_core::{async_trait, BackendError, NodeBackend, NodeInfo};
//! # use node_core::{Channel, Invoice, InvoiceStatus, MakeInvoiceRequest, PayResult};
//!
//! struct EmptyNode;
//!
//! #[async_trait]
//! impl NodeBackend for EmptyNode {
//!     fn name(&self) -> &str {
//!         "EmptyNode"
//!     }
//!
//!     async fn get_info(&self) -> Result<NodeInfo, BackendError> {
//!         Err(BackendError::Unavailable("not connected".to_string()))
//!     }
//!
//!     async fn get_balance(&self) -> Result<u64, BackendError> {
//!         Ok(0)
//!     }
//! #   async fn make_invoice(&self, _: MakeInvoiceRequest) -> Result<Invoice, BackendError> { unimplemented!() }
//! #   async fn pay_invoice(&self, _: &str, _: Option<u64>, _: u64) -> Result<PayResult, BackendError> { unimplemented!() }
//! #   async fn lookup_invoice(&self, _: &str) -> Result<InvoiceStatus, BackendError> { unimplemented!() }
//! #   async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> { unimplemented!() }
//! }
//! ```

mod bolt11;
mod deadline;
mod error;
mod trait_def;
mod types;

pub use bolt11::{decode_bolt11, DecodedInvoice};
pub use deadline::with_deadline;
pub use error::BackendError;
pub use trait_def::NodeBackend;
pub use types::{
    Channel, Invoice, InvoiceState, InvoiceStatus, MakeInvoiceRequest, NodeInfo, PayResult,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
