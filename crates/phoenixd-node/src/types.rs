//! phoenixd API response shapes.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetInfoResponse {
    pub node_id: String,
    #[serde(default)]
    pub channels: Vec<ChannelResponse>,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub block_height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelResponse {
    pub channel_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub balance_sat: u64,
    #[serde(default)]
    pub capacity_sat: u64,
    #[serde(default)]
    pub funding_tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BalanceResponse {
    pub balance_sat: u64,
    #[serde(default)]
    pub fee_credit_sat: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateInvoiceResponse {
    pub payment_hash: String,
    pub serialized: String,
}

/// `/payinvoice` answers 200 for both outcomes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PayInvoiceResponse {
    #[serde(rename_all = "camelCase")]
    Paid {
        recipient_amount_sat: u64,
        routing_fee_sat: u64,
        payment_hash: String,
        payment_preimage: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IncomingPayment {
    pub payment_hash: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub received_sat: u64,
    /// Millisatoshis.
    #[serde(default)]
    pub fees: u64,
    /// Unix milliseconds.
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingPayment {
    pub payment_hash: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub sent: u64,
    /// Millisatoshis.
    #[serde(default)]
    pub fees: u64,
    /// Unix milliseconds.
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_response_variants() {
        let paid: PayInvoiceResponse = serde_json::from_str(
            r#"{"recipientAmountSat":10,"routingFeeSat":1,"paymentId":"x","paymentHash":"ab","paymentPreimage":"cd"}"#,
        )
        .unwrap();
        assert!(matches!(paid, PayInvoiceResponse::Paid { routing_fee_sat: 1, .. }));

        let failed: PayInvoiceResponse =
            serde_json::from_str(r#"{"paymentId":"x","reason":"no route"}"#).unwrap();
        assert!(matches!(failed, PayInvoiceResponse::Failed { reason } if reason == "no route"));
    }
}
