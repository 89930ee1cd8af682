use database::transaction::{self, NewTransaction};
use database::{unix_timestamp, Direction};
use node_core::MakeInvoiceRequest;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{authorize, msat_to_i64, parse_params, to_result, TransactionView};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
struct MakeInvoiceParams {
    amount: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_hash: String,
    #[serde(default)]
    expiry: Option<u64>,
}

/// Issue an invoice and record it as a pending incoming row owned by the app.
pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    let params: MakeInvoiceParams = parse_params(request)?;
    if params.amount == 0 {
        return Err(ServiceError::BadRequest("amount must be positive".to_string()));
    }
    let amount_msat = msat_to_i64(params.amount)?;

    authorize(ctx, request, Some(amount_msat)).await?;

    let invoice_request = MakeInvoiceRequest {
        amount_msat: params.amount,
        description: params.description.clone(),
        description_hash: (!params.description_hash.is_empty())
            .then(|| params.description_hash.clone()),
        expiry_secs: params
            .expiry
            .filter(|expiry| *expiry > 0)
            .unwrap_or(ctx.config.default_invoice_expiry_secs),
    };
    let invoice = ctx
        .call(move |node| async move { node.make_invoice(invoice_request).await })
        .await?;

    let recorded = transaction::create_pending_transaction(
        ctx.pool(),
        &NewTransaction {
            app_id: Some(request.app.id),
            request_event_id: Some(request.request_event_id()),
            direction: Direction::Incoming,
            amount_msat,
            fee_reserve_msat: 0,
            payment_hash: invoice.payment_hash,
            preimage: invoice.preimage,
            payment_request: invoice.bolt11,
            description: params.description,
            description_hash: params.description_hash,
            expires_at: Some(invoice.expires_at),
        },
        unix_timestamp(),
    )
    .await?;

    info!(
        app_id = request.app.id,
        payment_hash = %recorded.payment_hash,
        amount_msat,
        "Created invoice"
    );
    to_result(&TransactionView::from(&recorded))
}
