//! clnrest request and response shapes.

use serde::Deserialize;

/// Amounts are plain integers on current CLN and `{"msat": n}` on older
/// releases and Greenlight.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub(crate) enum Msat {
    Plain(u64),
    Wrapped { msat: u64 },
}

impl Msat {
    pub fn msat(self) -> u64 {
        match self {
            Msat::Plain(msat) | Msat::Wrapped { msat } => msat,
        }
    }
}

impl Default for Msat {
    fn default() -> Self {
        Msat::Plain(0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetInfoResponse {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub blockheight: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListFundsResponse {
    #[serde(default)]
    pub channels: Vec<FundChannel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FundChannel {
    pub peer_id: String,
    #[serde(default)]
    pub our_amount_msat: Msat,
    #[serde(default)]
    pub amount_msat: Msat,
    #[serde(default)]
    pub funding_txid: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl FundChannel {
    pub fn is_active(&self) -> bool {
        self.state.as_deref().map_or(true, |s| s == "CHANNELD_NORMAL")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InvoiceResponse {
    pub bolt11: String,
    pub payment_hash: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PayResponse {
    pub payment_hash: String,
    #[serde(default)]
    pub payment_preimage: String,
    pub amount_msat: Msat,
    pub amount_sent_msat: Msat,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListInvoicesResponse {
    #[serde(default)]
    pub invoices: Vec<ListedInvoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListedInvoice {
    pub payment_hash: String,
    pub status: String,
    #[serde(default)]
    pub amount_msat: Option<Msat>,
    #[serde(default)]
    pub amount_received_msat: Option<Msat>,
    #[serde(default)]
    pub payment_preimage: Option<String>,
    #[serde(default)]
    pub paid_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListPaysResponse {
    #[serde(default)]
    pub pays: Vec<ListedPay>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListedPay {
    pub payment_hash: String,
    pub status: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub amount_msat: Option<Msat>,
    #[serde(default)]
    pub amount_sent_msat: Option<Msat>,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectResponse {
    pub id: String,
}
