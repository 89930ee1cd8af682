//! The NodeBackend trait definition.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{Channel, Invoice, InvoiceStatus, MakeInvoiceRequest, NodeInfo, PayResult};

/// Capability surface of a Lightning node.
///
/// One implementation exists per node software. The trait is object-safe
/// and is used as `Arc<dyn NodeBackend>`.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Human-readable name of the implementation.
    fn name(&self) -> &str;

    /// Node identity and chain tip.
    async fn get_info(&self) -> Result<NodeInfo, BackendError>;

    /// Total spendable balance across all channels, in msat.
    async fn get_balance(&self) -> Result<u64, BackendError>;

    /// Issue an invoice. Fails with [`BackendError::InvalidAmount`] for a
    /// zero amount.
    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError>;

    /// Pay a bolt11 invoice, optionally overriding its amount.
    ///
    /// The routing fee must not exceed `max_fee_msat`. A backend that cannot
    /// guarantee the limit fails with [`BackendError::PaymentFailed`] before
    /// sending anything.
    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError>;

    /// Status of an invoice or payment by hash, used for reconciliation.
    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError>;

    /// Open channels.
    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError>;

    /// Connect to a peer given `pubkey@host:port`. Returns the peer id.
    ///
    /// Default implementation reports the capability as unsupported.
    async fn connect_peer(&self, _uri: &str) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("connect_peer"))
    }
}

#[async_trait]
impl<T: NodeBackend + ?Sized> NodeBackend for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get_info(&self) -> Result<NodeInfo, BackendError> {
        (**self).get_info().await
    }

    async fn get_balance(&self) -> Result<u64, BackendError> {
        (**self).get_balance().await
    }

    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError> {
        (**self).make_invoice(request).await
    }

    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError> {
        (**self).pay_invoice(bolt11, amount_msat, max_fee_msat).await
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError> {
        (**self).lookup_invoice(payment_hash).await
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> {
        (**self).list_channels().await
    }

    async fn connect_peer(&self, uri: &str) -> Result<String, BackendError> {
        (**self).connect_peer(uri).await
    }
}
