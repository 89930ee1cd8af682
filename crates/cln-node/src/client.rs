//! clnrest HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use node_core::{
    BackendError, Channel, Invoice, InvoiceState, InvoiceStatus, MakeInvoiceRequest, NodeBackend,
    NodeInfo, PayResult,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::ClnConfig;
use crate::types::{
    ConnectResponse, GetInfoResponse, InvoiceResponse, ListFundsResponse, ListInvoicesResponse,
    ListPaysResponse, PayResponse, RpcError,
};

/// A Core Lightning node reached through clnrest.
#[derive(Clone)]
pub struct ClnNode {
    http: Client,
    config: ClnConfig,
}

/// Failure of one clnrest call.
enum CallError {
    /// The node rejected the command.
    Rpc(RpcError),
    Backend(BackendError),
}

impl From<CallError> for BackendError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Rpc(rpc) => BackendError::Backend(format!("CLN error {}: {}", rpc.code, rpc.message)),
            CallError::Backend(err) => err,
        }
    }
}

fn transport_error(err: reqwest::Error) -> CallError {
    CallError::Backend(if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() || err.is_request() {
        BackendError::Unavailable(err.to_string())
    } else {
        BackendError::Backend(err.to_string())
    })
}

impl ClnNode {
    pub fn new(config: ClnConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| BackendError::Backend(format!("http client: {e}")))?;

        info!(url = %config.url, "Created CLN backend");
        Ok(Self { http, config })
    }

    async fn rpc_call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, CallError> {
        let url = format!("{}/v1/{}", self.config.url, method);
        debug!(method = %method, "clnrest call");

        let response = self
            .http
            .post(&url)
            .header("Rune", &self.config.rune)
            .json(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CallError::Backend(BackendError::Unavailable(
                "clnrest rejected the rune".to_string(),
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<RpcError>(&body) {
                Ok(rpc) => Err(CallError::Rpc(rpc)),
                Err(_) => Err(CallError::Backend(BackendError::Backend(format!(
                    "HTTP {status}: {body}"
                )))),
            };
        }

        response.json::<R>().await.map_err(transport_error)
    }

    async fn list_funds(&self) -> Result<ListFundsResponse, BackendError> {
        Ok(self.rpc_call("listfunds", json!({})).await?)
    }
}

#[async_trait]
impl NodeBackend for ClnNode {
    fn name(&self) -> &str {
        "cln"
    }

    async fn get_info(&self) -> Result<NodeInfo, BackendError> {
        let info: GetInfoResponse = self.rpc_call("getinfo", json!({})).await?;
        Ok(NodeInfo {
            pubkey: info.id,
            alias: info.alias,
            color: info.color,
            network: info.network,
            block_height: info.blockheight,
            block_hash: String::new(),
        })
    }

    async fn get_balance(&self) -> Result<u64, BackendError> {
        let funds = self.list_funds().await?;
        Ok(funds
            .channels
            .iter()
            .filter(|channel| channel.is_active())
            .map(|channel| channel.our_amount_msat.msat())
            .sum())
    }

    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError> {
        if request.amount_msat == 0 {
            return Err(BackendError::InvalidAmount("amount must be positive".to_string()));
        }
        // CLN can only commit to the hash of a description it was given.
        if request.description_hash.is_some() {
            return Err(BackendError::NotSupported("description_hash"));
        }

        let params = json!({
            "amount_msat": request.amount_msat,
            "label": uuid::Uuid::new_v4().to_string(),
            "description": request.description,
            "expiry": request.expiry_secs,
        });
        let invoice: InvoiceResponse = self.rpc_call("invoice", params).await?;

        Ok(Invoice {
            bolt11: invoice.bolt11,
            payment_hash: invoice.payment_hash,
            preimage: None,
            expires_at: invoice.expires_at,
        })
    }

    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError> {
        // `maxfee` overrides `maxfeepercent` and `exemptfee`.
        let mut params = json!({ "bolt11": bolt11, "maxfee": max_fee_msat });
        if let Some(amount_msat) = amount_msat {
            params["amount_msat"] = json!(amount_msat);
        }

        let paid: PayResponse = match self.rpc_call("pay", params).await {
            Ok(paid) => paid,
            Err(CallError::Rpc(rpc)) => {
                warn!(code = rpc.code, message = %rpc.message, "CLN payment failed");
                return Err(if rpc.message.contains("already paid") {
                    BackendError::AlreadyPaid
                } else {
                    BackendError::PaymentFailed(rpc.message)
                });
            }
            Err(CallError::Backend(err)) => return Err(err),
        };

        if paid.status != "complete" {
            // `pending` means the node is still trying; the caller reconciles.
            return Err(match paid.status.as_str() {
                "pending" => BackendError::Timeout,
                other => BackendError::PaymentFailed(format!("payment status {other}")),
            });
        }

        let amount = paid.amount_msat.msat();
        Ok(PayResult {
            payment_hash: paid.payment_hash,
            preimage: paid.payment_preimage,
            amount_msat: amount,
            fee_msat: paid.amount_sent_msat.msat().saturating_sub(amount),
        })
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError> {
        let invoices: ListInvoicesResponse = self
            .rpc_call("listinvoices", json!({ "payment_hash": payment_hash }))
            .await?;

        if let Some(invoice) = invoices.invoices.into_iter().next() {
            let paid = invoice.status == "paid";
            let amount = invoice
                .amount_received_msat
                .or(invoice.amount_msat)
                .map(|m| m.msat())
                .unwrap_or(0);
            return Ok(InvoiceStatus {
                payment_hash: invoice.payment_hash,
                // Expired invoices stay pending in the ledger.
                state: if paid {
                    InvoiceState::Settled
                } else {
                    InvoiceState::Pending
                },
                preimage: invoice.payment_preimage.filter(|_| paid),
                amount_msat: amount,
                fee_msat: 0,
                settled_at: invoice.paid_at.filter(|_| paid),
            });
        }

        let pays: ListPaysResponse = self
            .rpc_call("listpays", json!({ "payment_hash": payment_hash }))
            .await?;

        // The latest attempt decides the outcome.
        if let Some(pay) = pays.pays.into_iter().last() {
            let state = match pay.status.as_str() {
                "complete" => InvoiceState::Settled,
                "failed" => InvoiceState::Failed,
                _ => InvoiceState::Pending,
            };
            let amount = pay.amount_msat.map(|m| m.msat()).unwrap_or(0);
            let sent = pay.amount_sent_msat.map(|m| m.msat()).unwrap_or(amount);
            let settled = state == InvoiceState::Settled;
            return Ok(InvoiceStatus {
                payment_hash: pay.payment_hash,
                state,
                preimage: pay.preimage.filter(|_| settled),
                amount_msat: amount,
                fee_msat: sent.saturating_sub(amount),
                settled_at: pay.completed_at.filter(|_| settled),
            });
        }

        Err(BackendError::NotFound(payment_hash.to_string()))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> {
        let funds = self.list_funds().await?;
        Ok(funds
            .channels
            .into_iter()
            .map(|channel| Channel {
                peer_id: channel.peer_id,
                local_msat: channel.our_amount_msat.msat(),
                total_msat: channel.amount_msat.msat(),
                funding_tx_id: channel.funding_txid,
                channel_id: channel.channel_id,
            })
            .collect())
    }

    async fn connect_peer(&self, uri: &str) -> Result<String, BackendError> {
        let connected: ConnectResponse = self.rpc_call("connect", json!({ "id": uri })).await?;
        info!(peer_id = %connected.id, "Connected to peer");
        Ok(connected.id)
    }
}

impl std::fmt::Debug for ClnNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClnNode").field("config", &self.config).finish()
    }
}
