use database::transaction;
use serde::Serialize;
use serde_json::Value;

use super::{authorize, to_result};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct GetBalanceResult {
    balance: i64,
}

/// Isolated apps see their own sub-ledger, everyone else the node balance.
pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let balance = if request.app.isolated {
        transaction::sum_isolated_balance(ctx.pool(), request.app.id).await?
    } else {
        let balance = ctx.call(|node| async move { node.get_balance().await }).await?;
        i64::try_from(balance).map_err(|_| ServiceError::Internal("balance overflow".to_string()))?
    };

    to_result(&GetBalanceResult { balance })
}
