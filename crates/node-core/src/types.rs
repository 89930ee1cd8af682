//! Request and result types shared by all backends.
//!
//! Amounts are millisatoshis, timestamps are unix seconds.

use serde::{Deserialize, Serialize};

/// Identity and chain position of the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub pubkey: String,
    pub alias: String,
    pub color: String,
    pub network: String,
    pub block_height: u32,
    pub block_hash: String,
}

/// An open channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub peer_id: String,
    pub local_msat: u64,
    pub total_msat: u64,
    pub funding_tx_id: String,
    pub channel_id: String,
}

/// Parameters for issuing an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeInvoiceRequest {
    pub amount_msat: u64,
    pub description: String,
    /// Hex sha256 to commit to instead of the plain description.
    pub description_hash: Option<String>,
    pub expiry_secs: u64,
}

/// An invoice issued by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub bolt11: String,
    pub payment_hash: String,
    /// Set when the backend generated the preimage itself and reveals it.
    pub preimage: Option<String>,
    pub expires_at: i64,
}

/// Outcome of a successful payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayResult {
    pub payment_hash: String,
    pub preimage: String,
    pub amount_msat: u64,
    pub fee_msat: u64,
}

/// Lifecycle state as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Pending,
    Settled,
    Failed,
}

/// Current status of an invoice or outgoing payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceStatus {
    pub payment_hash: String,
    pub state: InvoiceState,
    pub preimage: Option<String>,
    pub amount_msat: u64,
    pub fee_msat: u64,
    pub settled_at: Option<i64>,
}
