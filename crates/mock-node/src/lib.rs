//! Mock node backends for exercising the gateway without a real node.
//!
//! This crate provides implementations of the `NodeBackend` trait for testing:
//! - `MockNode` - in-memory scriptable node that issues real signed regtest invoices
//! - `DelayedNode` - wraps another backend with artificial latency
//!
//! # Example
//!
//! ```rust
//! use mock_node::{MakeInvoiceRequest, MockNode, NodeBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mock_node::BackendError> {
//!     let node = MockNode::new().with_balance(100_000_000);
//!
//!     let invoice = node
//!         .make_invoice(MakeInvoiceRequest {
//!             amount_msat: 21_000,
//!             description: "coffee".to_string(),
//!             description_hash: None,
//!             expiry_secs: 3600,
//!         })
//!         .await?;
//!     println!("Invoice: {}", invoice.bolt11);
//!     Ok(())
//! }
//! ```

mod delayed;
mod invoice;
mod mock;

// Re-export node-core types for convenience
pub use node_core::{
    async_trait, BackendError, Channel, Invoice, InvoiceState, InvoiceStatus, MakeInvoiceRequest,
    NodeBackend, NodeInfo, PayResult,
};

pub use delayed::DelayedNode;
pub use invoice::RemoteInvoice;
pub use mock::{MockNode, PayOutcome};
