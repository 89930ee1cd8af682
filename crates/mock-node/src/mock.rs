//! Scriptable in-memory node.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use node_core::{
    decode_bolt11, BackendError, Channel, Invoice, InvoiceState, InvoiceStatus,
    MakeInvoiceRequest, NodeBackend, NodeInfo, PayResult,
};

use crate::invoice::{self, RemoteInvoice};

/// How the next `pay_invoice` call resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayOutcome {
    /// Pay and debit amount plus the configured fee.
    Succeed,
    /// Fail with [`BackendError::PaymentFailed`].
    Fail(String),
    /// Return [`BackendError::Timeout`] and leave the payment in flight.
    Hang,
}

#[derive(Debug, Clone)]
struct IssuedInvoice {
    preimage: String,
    amount_msat: u64,
    settled_at: Option<i64>,
}

#[derive(Debug)]
struct MockState {
    balance_msat: u64,
    fee_msat: u64,
    channels: Vec<Channel>,
    peers: Vec<String>,
    issued: HashMap<String, IssuedInvoice>,
    remote_preimages: HashMap<String, String>,
    payments: HashMap<String, InvoiceStatus>,
    /// Fee limit of each payment left in flight.
    fee_limits: HashMap<String, u64>,
    script: VecDeque<PayOutcome>,
    pay_calls: usize,
    unavailable: bool,
}

/// A node that keeps everything in memory.
///
/// Payments succeed by default. Queue outcomes with
/// [`MockNode::script_payment`] to exercise failure paths.
#[derive(Debug)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl MockNode {
    /// An empty node with no balance and no channels.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                balance_msat: 0,
                fee_msat: 0,
                channels: Vec::new(),
                peers: Vec::new(),
                issued: HashMap::new(),
                remote_preimages: HashMap::new(),
                payments: HashMap::new(),
                fee_limits: HashMap::new(),
                script: VecDeque::new(),
                pay_calls: 0,
                unavailable: false,
            }),
        }
    }

    /// Set the starting balance.
    pub fn with_balance(self, balance_msat: u64) -> Self {
        self.lock().balance_msat = balance_msat;
        self
    }

    /// Routing fee charged on every successful payment. Payments whose fee
    /// limit is below it fail.
    pub fn with_fee(self, fee_msat: u64) -> Self {
        self.lock().fee_msat = fee_msat;
        self
    }

    /// Channels reported by `list_channels`.
    pub fn with_channels(self, channels: Vec<Channel>) -> Self {
        self.lock().channels = channels;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the outcome of a future payment.
    pub fn script_payment(&self, outcome: PayOutcome) {
        self.lock().script.push_back(outcome);
    }

    /// Make every call fail with [`BackendError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn set_balance(&self, balance_msat: u64) {
        self.lock().balance_msat = balance_msat;
    }

    /// Number of `pay_invoice` calls that reached the node.
    pub fn pay_calls(&self) -> usize {
        self.lock().pay_calls
    }

    /// Simulate a payer settling one of our invoices.
    pub fn receive_payment(&self, payment_hash: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        let settled_at = now();
        let issued = state
            .issued
            .get_mut(payment_hash)
            .ok_or_else(|| BackendError::NotFound(payment_hash.to_string()))?;
        if issued.settled_at.is_some() {
            return Err(BackendError::AlreadyPaid);
        }
        issued.settled_at = Some(settled_at);
        let amount = issued.amount_msat;
        state.balance_msat += amount;
        Ok(())
    }

    /// Resolve a payment left in flight by [`PayOutcome::Hang`]. The payment
    /// fails if the current fee is above its limit.
    pub fn complete_payment(&self, payment_hash: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        let fee = state.fee_msat;
        let limit = state.fee_limits.remove(payment_hash).unwrap_or(u64::MAX);
        let completed_at = now();
        let status = state
            .payments
            .get_mut(payment_hash)
            .ok_or_else(|| BackendError::NotFound(payment_hash.to_string()))?;
        if status.state != InvoiceState::Pending {
            return Err(BackendError::AlreadyPaid);
        }
        if fee > limit {
            status.state = InvoiceState::Failed;
            status.preimage = None;
            return Err(BackendError::PaymentFailed(fee_limit_reason(fee, limit)));
        }
        status.state = InvoiceState::Settled;
        status.fee_msat = fee;
        status.settled_at = Some(completed_at);
        let spent = status.amount_msat + fee;
        state.balance_msat = state.balance_msat.saturating_sub(spent);
        Ok(())
    }

    /// Issue an invoice from another node, for this node to pay.
    pub fn remote_invoice(
        &self,
        amount_msat: u64,
        description: &str,
    ) -> Result<RemoteInvoice, BackendError> {
        let signed = invoice::sign_remote(amount_msat, description)?;
        self.lock()
            .remote_preimages
            .insert(signed.payment_hash.clone(), signed.preimage.clone());

        Ok(RemoteInvoice {
            bolt11: signed.bolt11,
            payment_hash: signed.payment_hash,
            preimage: signed.preimage,
        })
    }

    fn ensure_available(state: &MockState) -> Result<(), BackendError> {
        if state.unavailable {
            return Err(BackendError::Unavailable("mock node offline".to_string()));
        }
        Ok(())
    }
}

fn fee_limit_reason(fee_msat: u64, max_fee_msat: u64) -> String {
    format!("routing fee {fee_msat} msat exceeds limit of {max_fee_msat} msat")
}

#[async_trait]
impl NodeBackend for MockNode {
    fn name(&self) -> &str {
        "MockNode"
    }

    async fn get_info(&self) -> Result<NodeInfo, BackendError> {
        Self::ensure_available(&self.lock())?;
        Ok(NodeInfo {
            pubkey: invoice::node_pubkey()?,
            alias: "mock".to_string(),
            color: "#3399ff".to_string(),
            network: "regtest".to_string(),
            block_height: 100,
            block_hash: "00".repeat(32),
        })
    }

    async fn get_balance(&self) -> Result<u64, BackendError> {
        let state = self.lock();
        Self::ensure_available(&state)?;
        Ok(state.balance_msat)
    }

    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError> {
        Self::ensure_available(&self.lock())?;
        if request.amount_msat == 0 {
            return Err(BackendError::InvalidAmount("amount must be positive".to_string()));
        }

        let signed = invoice::sign_local(
            request.amount_msat,
            &request.description,
            request.description_hash.as_deref(),
            request.expiry_secs,
        )?;

        self.lock().issued.insert(
            signed.payment_hash.clone(),
            IssuedInvoice {
                preimage: signed.preimage.clone(),
                amount_msat: request.amount_msat,
                settled_at: None,
            },
        );

        Ok(Invoice {
            bolt11: signed.bolt11,
            payment_hash: signed.payment_hash,
            preimage: Some(signed.preimage),
            expires_at: signed.expires_at,
        })
    }

    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError> {
        let decoded = decode_bolt11(bolt11)?;
        let amount = amount_msat
            .or(decoded.amount_msat)
            .filter(|amount| *amount > 0)
            .ok_or_else(|| BackendError::InvalidAmount("invoice has no amount".to_string()))?;

        let mut state = self.lock();
        Self::ensure_available(&state)?;
        state.pay_calls += 1;

        if let Some(existing) = state.payments.get(&decoded.payment_hash) {
            if existing.state == InvoiceState::Settled {
                return Err(BackendError::AlreadyPaid);
            }
        }

        let fee = state.fee_msat;
        if amount + fee > state.balance_msat {
            return Err(BackendError::InsufficientBalance);
        }

        let mut status = InvoiceStatus {
            payment_hash: decoded.payment_hash.clone(),
            state: InvoiceState::Pending,
            preimage: None,
            amount_msat: amount,
            fee_msat: 0,
            settled_at: None,
        };

        if fee > max_fee_msat {
            status.state = InvoiceState::Failed;
            state.payments.insert(decoded.payment_hash, status);
            return Err(BackendError::PaymentFailed(fee_limit_reason(fee, max_fee_msat)));
        }

        let outcome = state.script.pop_front().unwrap_or(PayOutcome::Succeed);
        let preimage = state
            .remote_preimages
            .get(&decoded.payment_hash)
            .or_else(|| state.issued.get(&decoded.payment_hash).map(|i| &i.preimage))
            .cloned()
            .unwrap_or_else(|| hex::encode(rand::random::<[u8; 32]>()));
        status.preimage = Some(preimage.clone());

        match outcome {
            PayOutcome::Succeed => {
                status.state = InvoiceState::Settled;
                status.fee_msat = fee;
                status.settled_at = Some(now());
                state.balance_msat -= amount + fee;
                state.payments.insert(decoded.payment_hash.clone(), status);
                tracing::debug!(payment_hash = %decoded.payment_hash, amount, "Mock payment settled");
                Ok(PayResult {
                    payment_hash: decoded.payment_hash,
                    preimage,
                    amount_msat: amount,
                    fee_msat: fee,
                })
            }
            PayOutcome::Fail(reason) => {
                status.state = InvoiceState::Failed;
                status.preimage = None;
                state.payments.insert(decoded.payment_hash, status);
                Err(BackendError::PaymentFailed(reason))
            }
            PayOutcome::Hang => {
                state
                    .fee_limits
                    .insert(decoded.payment_hash.clone(), max_fee_msat);
                state.payments.insert(decoded.payment_hash, status);
                Err(BackendError::Timeout)
            }
        }
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError> {
        let state = self.lock();
        Self::ensure_available(&state)?;

        if let Some(issued) = state.issued.get(payment_hash) {
            let settled = issued.settled_at.is_some();
            return Ok(InvoiceStatus {
                payment_hash: payment_hash.to_string(),
                state: if settled {
                    InvoiceState::Settled
                } else {
                    InvoiceState::Pending
                },
                preimage: settled.then(|| issued.preimage.clone()),
                amount_msat: issued.amount_msat,
                fee_msat: 0,
                settled_at: issued.settled_at,
            });
        }

        if let Some(payment) = state.payments.get(payment_hash) {
            let mut status = payment.clone();
            if status.state != InvoiceState::Settled {
                status.preimage = None;
            }
            return Ok(status);
        }

        Err(BackendError::NotFound(payment_hash.to_string()))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> {
        let state = self.lock();
        Self::ensure_available(&state)?;
        Ok(state.channels.clone())
    }

    async fn connect_peer(&self, uri: &str) -> Result<String, BackendError> {
        let mut state = self.lock();
        Self::ensure_available(&state)?;

        let peer_id = match uri.split_once('@') {
            Some((pubkey, address)) if pubkey.len() == 66 && !address.is_empty() => pubkey,
            _ => return Err(BackendError::Backend(format!("invalid peer uri: {uri}"))),
        };
        if !state.peers.iter().any(|p| p == peer_id) {
            state.peers.push(peer_id.to_string());
        }
        Ok(peer_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount_msat: u64) -> MakeInvoiceRequest {
        MakeInvoiceRequest {
            amount_msat,
            description: "test".to_string(),
            description_hash: None,
            expiry_secs: 600,
        }
    }

    #[tokio::test]
    async fn test_invoice_roundtrip_through_lookup() {
        let node = MockNode::new();
        let invoice = node.make_invoice(request(5_000)).await.unwrap();

        let pending = node.lookup_invoice(&invoice.payment_hash).await.unwrap();
        assert_eq!(pending.state, InvoiceState::Pending);
        assert_eq!(pending.preimage, None);

        node.receive_payment(&invoice.payment_hash).unwrap();
        let settled = node.lookup_invoice(&invoice.payment_hash).await.unwrap();
        assert_eq!(settled.state, InvoiceState::Settled);
        assert_eq!(settled.preimage, invoice.preimage);
        assert_eq!(node.get_balance().await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_zero_amount_invoice_rejected() {
        let node = MockNode::new();
        let result = node.make_invoice(request(0)).await;
        assert!(matches!(result, Err(BackendError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_pay_debits_balance_and_fee() {
        let node = MockNode::new().with_balance(100_000).with_fee(10);
        let remote = node.remote_invoice(1_000, "pizza").unwrap();

        let paid = node.pay_invoice(&remote.bolt11, None, 10_000).await.unwrap();
        assert_eq!(paid.preimage, remote.preimage);
        assert_eq!(paid.fee_msat, 10);
        assert_eq!(node.get_balance().await.unwrap(), 98_990);

        let again = node.pay_invoice(&remote.bolt11, None, 10_000).await;
        assert_eq!(again, Err(BackendError::AlreadyPaid));
    }

    #[tokio::test]
    async fn test_scripted_failure_and_hang() {
        let node = MockNode::new().with_balance(100_000);
        node.script_payment(PayOutcome::Fail("no route".to_string()));
        node.script_payment(PayOutcome::Hang);

        let failing = node.remote_invoice(1_000, "a").unwrap();
        let result = node.pay_invoice(&failing.bolt11, None, 10_000).await;
        assert_eq!(result, Err(BackendError::PaymentFailed("no route".to_string())));

        let hanging = node.remote_invoice(2_000, "b").unwrap();
        let result = node.pay_invoice(&hanging.bolt11, None, 10_000).await;
        assert_eq!(result, Err(BackendError::Timeout));
        assert_eq!(
            node.lookup_invoice(&hanging.payment_hash).await.unwrap().state,
            InvoiceState::Pending
        );

        node.complete_payment(&hanging.payment_hash).unwrap();
        let status = node.lookup_invoice(&hanging.payment_hash).await.unwrap();
        assert_eq!(status.state, InvoiceState::Settled);
        assert_eq!(status.preimage.as_deref(), Some(hanging.preimage.as_str()));
        assert_eq!(node.get_balance().await.unwrap(), 98_000);
        assert_eq!(node.pay_calls(), 2);
    }

    #[tokio::test]
    async fn test_fee_above_limit_fails_without_debit() {
        let node = MockNode::new().with_balance(100_000).with_fee(500);
        let remote = node.remote_invoice(1_000, "capped").unwrap();

        let result = node.pay_invoice(&remote.bolt11, None, 499).await;
        assert!(matches!(result, Err(BackendError::PaymentFailed(_))));
        assert_eq!(node.get_balance().await.unwrap(), 100_000);
        assert_eq!(
            node.lookup_invoice(&remote.payment_hash).await.unwrap().state,
            InvoiceState::Failed
        );

        let paid = node.pay_invoice(&remote.bolt11, None, 500).await.unwrap();
        assert_eq!(paid.fee_msat, 500);
    }

    #[tokio::test]
    async fn test_hung_payment_keeps_its_fee_limit() {
        let node = MockNode::new().with_balance(100_000).with_fee(100);
        node.script_payment(PayOutcome::Hang);
        let remote = node.remote_invoice(1_000, "in flight").unwrap();
        let result = node.pay_invoice(&remote.bolt11, None, 200).await;
        assert_eq!(result, Err(BackendError::Timeout));

        node.lock().fee_msat = 300;
        assert!(matches!(
            node.complete_payment(&remote.payment_hash),
            Err(BackendError::PaymentFailed(_))
        ));
        assert_eq!(
            node.lookup_invoice(&remote.payment_hash).await.unwrap().state,
            InvoiceState::Failed
        );
        assert_eq!(node.get_balance().await.unwrap(), 100_000);
    }

    #[tokio::test]
    async fn test_insufficient_balance_and_offline() {
        let node = MockNode::new().with_balance(500);
        let remote = node.remote_invoice(1_000, "too much").unwrap();
        let result = node.pay_invoice(&remote.bolt11, None, 10_000).await;
        assert_eq!(result, Err(BackendError::InsufficientBalance));

        node.set_unavailable(true);
        assert!(matches!(node.get_info().await, Err(BackendError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_peer() {
        let node = MockNode::new();
        let pubkey = format!("02{}", "ab".repeat(32));
        let peer = node
            .connect_peer(&format!("{pubkey}@127.0.0.1:9735"))
            .await
            .unwrap();
        assert_eq!(peer, pubkey);
        assert!(node.connect_peer("garbage").await.is_err());
    }
}
