//! One handler per wallet command.
//!
//! Every handler authorizes first, then does its backend and ledger work,
//! and returns the `result` object for a success response. Errors become
//! error responses in the dispatcher.

pub mod connect_peer;
pub mod get_balance;
pub mod get_info;
pub mod list_channels;
pub mod list_transactions;
pub mod lookup_invoice;
pub mod make_invoice;
pub mod pay_invoice;

use database::{unix_timestamp, Transaction, TransactionState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;
use crate::permissions;

pub(crate) fn parse_params<T: DeserializeOwned>(request: &DecodedRequest) -> Result<T, ServiceError> {
    request
        .request
        .params()
        .map_err(|e| ServiceError::BadRequest(format!("invalid params: {e}")))
}

pub(crate) fn to_result<T: Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Advisory permission check for the request's app and method.
pub(crate) async fn authorize(
    ctx: &ServiceContext,
    request: &DecodedRequest,
    amount_msat: Option<i64>,
) -> Result<(), ServiceError> {
    permissions::authorize(
        ctx.pool(),
        &request.app,
        request.method,
        amount_msat,
        unix_timestamp(),
    )
    .await?
    .into_result()?;
    Ok(())
}

pub(crate) fn msat_to_i64(amount_msat: u64) -> Result<i64, ServiceError> {
    i64::try_from(amount_msat).map_err(|_| ServiceError::BadRequest("amount too large".to_string()))
}

/// A ledger row as reported to apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    #[serde(rename = "type")]
    pub direction: String,
    pub state: String,
    pub invoice: String,
    pub description: String,
    pub description_hash: String,
    /// Empty unless settled.
    pub preimage: String,
    pub payment_hash: String,
    pub amount: i64,
    pub fees_paid: i64,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub settled_at: Option<i64>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        let preimage = match tx.state {
            TransactionState::Settled => tx.preimage.clone().unwrap_or_default(),
            _ => String::new(),
        };

        Self {
            direction: tx.direction.as_str().to_string(),
            state: tx.state.as_str().to_string(),
            invoice: tx.payment_request.clone(),
            description: tx.description.clone(),
            description_hash: tx.description_hash.clone(),
            preimage,
            payment_hash: tx.payment_hash.clone(),
            amount: tx.amount_msat,
            fees_paid: tx.fee_msat,
            created_at: tx.created_at,
            expires_at: tx.expires_at,
            settled_at: tx.settled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::Direction;

    fn row(state: TransactionState) -> Transaction {
        Transaction {
            id: 1,
            app_id: Some(1),
            request_event_id: None,
            direction: Direction::Incoming,
            state,
            amount_msat: 1_000,
            fee_msat: 0,
            fee_reserve_msat: 0,
            payment_hash: "aa".repeat(32),
            preimage: Some("bb".repeat(32)),
            payment_request: "lnbcrt1".to_string(),
            description: "coffee".to_string(),
            description_hash: String::new(),
            failure_reason: None,
            created_at: 10,
            updated_at: 10,
            settled_at: (state == TransactionState::Settled).then_some(20),
            expires_at: Some(100),
        }
    }

    #[test]
    fn test_preimage_hidden_until_settled() {
        let pending = TransactionView::from(&row(TransactionState::Pending));
        assert_eq!(pending.state, "pending");
        assert!(pending.preimage.is_empty());

        let settled = TransactionView::from(&row(TransactionState::Settled));
        assert_eq!(settled.state, "settled");
        assert_eq!(settled.preimage, "bb".repeat(32));
        assert_eq!(settled.settled_at, Some(20));
    }

    #[test]
    fn test_view_serializes_type_field() {
        let view = TransactionView::from(&row(TransactionState::Settled));
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], "incoming");
        assert_eq!(value["amount"], 1_000);
        assert_eq!(value["invoice"], "lnbcrt1");
    }
}
