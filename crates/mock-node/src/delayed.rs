//! Delayed node implementation - wraps another backend with artificial latency.

use std::time::Duration;

use node_core::{
    async_trait, BackendError, Channel, Invoice, InvoiceStatus, MakeInvoiceRequest, NodeBackend,
    NodeInfo, PayResult,
};
use tokio::time::sleep;

/// A backend that wraps another backend and delays its calls.
///
/// Useful for testing deadline handling and simulating slow payment routing.
/// By default only `pay_invoice` is delayed so reconciliation lookups stay
/// fast.
pub struct DelayedNode<B: NodeBackend> {
    inner: B,
    delay: Duration,
    delay_all: bool,
}

impl<B: NodeBackend> DelayedNode<B> {
    /// Delay payments by `delay`.
    pub fn new(inner: B, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            delay_all: false,
        }
    }

    /// Delay payments by `millis` milliseconds.
    pub fn with_millis(inner: B, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    /// Delay every call, not just payments.
    pub fn delay_all(mut self) -> Self {
        self.delay_all = true;
        self
    }

    async fn maybe_sleep(&self) {
        if self.delay_all {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl<B: NodeBackend> NodeBackend for DelayedNode<B> {
    fn name(&self) -> &str {
        "DelayedNode"
    }

    async fn get_info(&self) -> Result<NodeInfo, BackendError> {
        self.maybe_sleep().await;
        self.inner.get_info().await
    }

    async fn get_balance(&self) -> Result<u64, BackendError> {
        self.maybe_sleep().await;
        self.inner.get_balance().await
    }

    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError> {
        self.maybe_sleep().await;
        self.inner.make_invoice(request).await
    }

    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError> {
        sleep(self.delay).await;
        self.inner.pay_invoice(bolt11, amount_msat, max_fee_msat).await
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError> {
        self.maybe_sleep().await;
        self.inner.lookup_invoice(payment_hash).await
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> {
        self.maybe_sleep().await;
        self.inner.list_channels().await
    }

    async fn connect_peer(&self, uri: &str) -> Result<String, BackendError> {
        self.maybe_sleep().await;
        self.inner.connect_peer(uri).await
    }
}
