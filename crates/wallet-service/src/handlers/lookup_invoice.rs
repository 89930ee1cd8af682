use database::transaction;
use node_core::decode_bolt11;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{authorize, parse_params, to_result, TransactionView};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;
use crate::reconcile;

#[derive(Debug, Deserialize)]
struct LookupInvoiceParams {
    #[serde(default)]
    payment_hash: Option<String>,
    #[serde(default)]
    invoice: Option<String>,
}

/// Look up one of the app's own rows by payment hash or bolt11. Pending rows
/// are refreshed from the node first.
pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let params: LookupInvoiceParams = parse_params(request)?;
    let payment_hash = match (params.payment_hash, params.invoice) {
        (Some(hash), _) if !hash.is_empty() => hash,
        (_, Some(invoice)) if !invoice.is_empty() => decode_bolt11(&invoice)?.payment_hash,
        _ => {
            return Err(ServiceError::BadRequest(
                "payment_hash or invoice is required".to_string(),
            ))
        }
    };

    let found = transaction::find_for_app(ctx.pool(), request.app.id, &payment_hash)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("invoice {payment_hash}")))?;

    let current = match reconcile::refresh(ctx, found.clone()).await {
        Ok(current) => current,
        Err(ServiceError::Backend(err)) => {
            warn!(payment_hash = %payment_hash, error = %err, "Could not refresh from node");
            found
        }
        Err(err) => return Err(err),
    };
    to_result(&TransactionView::from(&current))
}
