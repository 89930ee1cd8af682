use database::transaction::{self, StateFilter, TransactionFilter};
use database::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{authorize, parse_params, to_result, TransactionView};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Default, Deserialize)]
struct ListTransactionsParams {
    #[serde(default)]
    from: Option<i64>,
    #[serde(default)]
    until: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default, rename = "type")]
    direction: Option<Direction>,
    #[serde(default)]
    unpaid: bool,
    #[serde(default)]
    unpaid_incoming: bool,
    #[serde(default)]
    unpaid_outgoing: bool,
}

impl ListTransactionsParams {
    /// Ledger filter over the app's own rows. Zero bounds mean unbounded.
    fn into_filter(self, app_id: i64) -> TransactionFilter {
        let state = if self.unpaid || (self.unpaid_incoming && self.unpaid_outgoing) {
            StateFilter::Unpaid
        } else if self.unpaid_outgoing {
            StateFilter::UnpaidOutgoing
        } else if self.unpaid_incoming {
            StateFilter::UnpaidIncoming
        } else {
            StateFilter::Paid
        };

        let positive = |value: Option<i64>| value.filter(|v| *v > 0);
        TransactionFilter {
            app_id: Some(app_id),
            direction: self.direction,
            state,
            from: positive(self.from),
            until: positive(self.until),
            limit: positive(self.limit),
            offset: positive(self.offset),
        }
    }
}

#[derive(Debug, Serialize)]
struct ListTransactionsResult {
    transactions: Vec<TransactionView>,
}

/// Served from the ledger only, never from the node.
pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let params: ListTransactionsParams = parse_params(request)?;
    let filter = params.into_filter(request.app.id);
    let rows = transaction::query_transactions(ctx.pool(), &filter).await?;

    to_result(&ListTransactionsResult {
        transactions: rows.iter().map(TransactionView::from).collect(),
    })
}
