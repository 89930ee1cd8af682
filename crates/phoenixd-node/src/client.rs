//! phoenixd HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use node_core::{
    BackendError, Channel, Invoice, InvoiceState, InvoiceStatus, MakeInvoiceRequest, NodeBackend,
    NodeInfo, PayResult,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::PhoenixdConfig;
use crate::types::{
    BalanceResponse, CreateInvoiceResponse, GetInfoResponse, IncomingPayment, OutgoingPayment,
    PayInvoiceResponse,
};

/// A phoenixd instance reached over HTTP.
#[derive(Clone)]
pub struct PhoenixdNode {
    http: Client,
    config: PhoenixdConfig,
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() || err.is_request() {
        BackendError::Unavailable(err.to_string())
    } else {
        BackendError::Backend(err.to_string())
    }
}

/// phoenixd takes no fee limit. Its outgoing fee is fixed at 0.4% plus 4 sat,
/// so a payment is only sent when that schedule fits the limit.
const FEE_PPM: u64 = 4_000;
const BASE_FEE_MSAT: u64 = 4_000;

fn max_routing_fee_msat(amount_msat: u64) -> u64 {
    amount_msat.saturating_mul(FEE_PPM) / 1_000_000 + BASE_FEE_MSAT
}

fn millis_to_secs(millis: Option<i64>) -> Option<i64> {
    millis.map(|ms| ms / 1000)
}

impl PhoenixdNode {
    pub fn new(config: PhoenixdConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| BackendError::Backend(format!("http client: {e}")))?;

        info!(url = %config.url, "Created phoenixd backend");
        Ok(Self { http, config })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.config.url, path))
            .basic_auth("", Some(&self.config.password))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.config.url, path))
            .basic_auth("", Some(&self.config.password))
    }

    /// Send a request and decode the JSON body. `Ok(None)` on 404.
    async fn call<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<R>, BackendError> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unavailable("phoenixd rejected credentials".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Backend(format!("HTTP {status}: {body}")));
        }

        let body = response.json::<R>().await.map_err(transport_error)?;
        Ok(Some(body))
    }

    async fn require<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<R, BackendError> {
        self.call(request)
            .await?
            .ok_or_else(|| BackendError::Backend(format!("{what} endpoint not found")))
    }

    async fn incoming(&self, payment_hash: &str) -> Result<Option<IncomingPayment>, BackendError> {
        self.call(self.get(&format!("/payments/incoming/{payment_hash}")))
            .await
    }

    async fn outgoing(&self, payment_hash: &str) -> Result<Option<OutgoingPayment>, BackendError> {
        self.call(self.get(&format!("/payments/outgoingbyhash/{payment_hash}")))
            .await
    }
}

#[async_trait]
impl NodeBackend for PhoenixdNode {
    fn name(&self) -> &str {
        "phoenixd"
    }

    async fn get_info(&self) -> Result<NodeInfo, BackendError> {
        let info: GetInfoResponse = self.require(self.get("/getinfo"), "getinfo").await?;
        Ok(NodeInfo {
            pubkey: info.node_id,
            alias: "phoenixd".to_string(),
            color: String::new(),
            network: info.chain,
            block_height: info.block_height,
            block_hash: String::new(),
        })
    }

    async fn get_balance(&self) -> Result<u64, BackendError> {
        let balance: BalanceResponse = self.require(self.get("/getbalance"), "getbalance").await?;
        debug!(
            balance_sat = balance.balance_sat,
            fee_credit_sat = balance.fee_credit_sat,
            "phoenixd balance"
        );
        Ok(balance.balance_sat * 1000)
    }

    async fn make_invoice(&self, request: MakeInvoiceRequest) -> Result<Invoice, BackendError> {
        // phoenixd invoices are denominated in whole satoshis.
        let amount_sat = request.amount_msat / 1000;
        if amount_sat == 0 {
            return Err(BackendError::InvalidAmount(
                "phoenixd needs at least 1 sat".to_string(),
            ));
        }

        let mut form = vec![
            ("amountSat", amount_sat.to_string()),
            ("expirySeconds", request.expiry_secs.to_string()),
        ];
        match &request.description_hash {
            Some(hash) => form.push(("descriptionHash", hash.clone())),
            None => form.push(("description", request.description.clone())),
        }

        let created: CreateInvoiceResponse = self
            .require(self.post("/createinvoice").form(&form), "createinvoice")
            .await?;
        let decoded = node_core::decode_bolt11(&created.serialized)?;

        Ok(Invoice {
            bolt11: created.serialized,
            payment_hash: created.payment_hash,
            preimage: None,
            expires_at: decoded.expires_at,
        })
    }

    async fn pay_invoice(
        &self,
        bolt11: &str,
        amount_msat: Option<u64>,
        max_fee_msat: u64,
    ) -> Result<PayResult, BackendError> {
        let amount = match amount_msat {
            Some(amount) => amount,
            None => node_core::decode_bolt11(bolt11)?
                .amount_msat
                .ok_or_else(|| BackendError::InvalidAmount("invoice has no amount".to_string()))?,
        };
        let worst_fee = max_routing_fee_msat(amount);
        if worst_fee > max_fee_msat {
            return Err(BackendError::PaymentFailed(format!(
                "routing fee may reach {worst_fee} msat, limit is {max_fee_msat} msat"
            )));
        }

        let mut form = vec![("invoice", bolt11.to_string())];
        if let Some(amount_msat) = amount_msat {
            form.push(("amountSat", (amount_msat / 1000).to_string()));
        }

        let response: PayInvoiceResponse = self
            .require(self.post("/payinvoice").form(&form), "payinvoice")
            .await?;

        match response {
            PayInvoiceResponse::Paid {
                recipient_amount_sat,
                routing_fee_sat,
                payment_hash,
                payment_preimage,
            } => {
                let fee_msat = routing_fee_sat * 1000;
                if fee_msat > max_fee_msat {
                    warn!(fee_msat, max_fee_msat, payment_hash = %payment_hash, "phoenixd fee above limit");
                }
                Ok(PayResult {
                    payment_hash,
                    preimage: payment_preimage,
                    amount_msat: recipient_amount_sat * 1000,
                    fee_msat,
                })
            }
            PayInvoiceResponse::Failed { reason } => {
                warn!(reason = %reason, "phoenixd payment failed");
                if reason.contains("already paid") {
                    Err(BackendError::AlreadyPaid)
                } else if reason.contains("insufficient") {
                    Err(BackendError::InsufficientBalance)
                } else {
                    Err(BackendError::PaymentFailed(reason))
                }
            }
        }
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus, BackendError> {
        if let Some(payment) = self.incoming(payment_hash).await? {
            return Ok(InvoiceStatus {
                payment_hash: payment.payment_hash,
                state: if payment.is_paid {
                    InvoiceState::Settled
                } else {
                    InvoiceState::Pending
                },
                preimage: payment.preimage.filter(|_| payment.is_paid),
                amount_msat: payment.received_sat * 1000,
                fee_msat: payment.fees,
                settled_at: millis_to_secs(payment.completed_at).filter(|_| payment.is_paid),
            });
        }

        if let Some(payment) = self.outgoing(payment_hash).await? {
            // A completed payment that is not paid has failed.
            let state = match (payment.is_paid, payment.completed_at) {
                (true, _) => InvoiceState::Settled,
                (false, Some(_)) => InvoiceState::Failed,
                (false, None) => InvoiceState::Pending,
            };
            return Ok(InvoiceStatus {
                payment_hash: payment.payment_hash,
                state,
                preimage: payment.preimage.filter(|_| payment.is_paid),
                amount_msat: payment.sent * 1000,
                fee_msat: payment.fees,
                settled_at: millis_to_secs(payment.completed_at).filter(|_| payment.is_paid),
            });
        }

        Err(BackendError::NotFound(payment_hash.to_string()))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, BackendError> {
        let info: GetInfoResponse = self.require(self.get("/getinfo"), "getinfo").await?;
        Ok(info
            .channels
            .into_iter()
            .map(|channel| Channel {
                peer_id: String::new(),
                local_msat: channel.balance_sat * 1000,
                total_msat: channel.capacity_sat * 1000,
                funding_tx_id: channel.funding_tx_id,
                channel_id: channel.channel_id,
            })
            .collect())
    }
}

impl std::fmt::Debug for PhoenixdNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixdNode")
            .field("config", &self.config)
            .finish()
    }
}
