use database::transaction::{self, NewTransaction};
use database::{unix_timestamp, DatabaseError, Direction, Transaction};
use node_core::{decode_bolt11, BackendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use super::{authorize, msat_to_i64, parse_params, to_result};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;
use crate::permissions::{self, fee_reserve_msat};

#[derive(Debug, Deserialize)]
struct PayInvoiceParams {
    invoice: String,
    /// Only used for invoices without an amount.
    #[serde(default)]
    amount: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PayInvoiceResult {
    preimage: String,
    fees_paid: i64,
}

/// Pay a bolt11 invoice.
///
/// The budget and isolated-balance checks are repeated under the app's lock
/// in the SQL transaction that inserts the pending row, so concurrent
/// payments from one app can never overspend. The node may spend at most the
/// row's fee reserve on routing. Budget usage is charged when the payment
/// settles.
pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    let params: PayInvoiceParams = parse_params(request)?;
    let decoded = decode_bolt11(&params.invoice)?;
    if decoded.is_expired(unix_timestamp()) {
        return Err(ServiceError::BadRequest("invoice has expired".to_string()));
    }

    let amount = match (decoded.amount_msat, params.amount) {
        (Some(amount), _) if amount > 0 => amount,
        (None, Some(amount)) if amount > 0 => amount,
        _ => return Err(ServiceError::BadRequest("invoice has no amount".to_string())),
    };
    let amount_msat = msat_to_i64(amount)?;

    authorize(ctx, request, Some(amount_msat)).await?;

    if transaction::has_settled_outgoing(ctx.pool(), &decoded.payment_hash).await? {
        return Err(BackendError::AlreadyPaid.into());
    }

    let pending = reserve(ctx, request, &params.invoice, &decoded.payment_hash, amount_msat).await?;
    info!(
        app_id = request.app.id,
        payment_hash = %pending.payment_hash,
        amount_msat,
        "Paying invoice"
    );

    let bolt11 = params.invoice.clone();
    let amount_override = decoded.amount_msat.is_none().then_some(amount);
    let max_fee_msat = pending.fee_reserve_msat.unsigned_abs();
    let paid = ctx
        .call(move |node| async move {
            node.pay_invoice(&bolt11, amount_override, max_fee_msat)
                .await
        })
        .await;

    match paid {
        Ok(paid) => {
            let settled = settle(ctx, &pending, &paid.preimage, paid.fee_msat).await?;
            info!(
                app_id = request.app.id,
                payment_hash = %settled.payment_hash,
                fee_msat = settled.fee_msat,
                "Payment settled"
            );
            to_result(&PayInvoiceResult {
                preimage: settled.preimage.unwrap_or_default(),
                fees_paid: settled.fee_msat,
            })
        }
        Err(err) if is_final(&err) => {
            let mut conn = ctx.pool().acquire().await?;
            transaction::mark_failed(
                &mut *conn,
                Direction::Outgoing,
                &pending.payment_hash,
                &err.to_string(),
                unix_timestamp(),
            )
            .await?;
            warn!(
                app_id = request.app.id,
                payment_hash = %pending.payment_hash,
                error = %err,
                "Payment failed"
            );
            Err(err.into())
        }
        Err(err) => {
            warn!(
                app_id = request.app.id,
                payment_hash = %pending.payment_hash,
                error = %err,
                "Payment outcome unknown, left pending"
            );
            Err(err.into())
        }
    }
}

/// Authoritative check and pending insert, serialized per app.
async fn reserve(
    ctx: &ServiceContext,
    request: &DecodedRequest,
    invoice: &str,
    payment_hash: &str,
    amount_msat: i64,
) -> Result<Transaction, ServiceError> {
    let _guard = ctx.locks.lock(request.app.id).await;
    let now = unix_timestamp();

    let mut db_tx = ctx.pool().begin().await?;
    permissions::check(&mut *db_tx, &request.app, request.method, Some(amount_msat), now)
        .await?
        .into_result()?;

    let created = transaction::create_pending_transaction(
        &mut *db_tx,
        &NewTransaction {
            app_id: Some(request.app.id),
            request_event_id: Some(request.request_event_id()),
            direction: Direction::Outgoing,
            amount_msat,
            fee_reserve_msat: fee_reserve_msat(amount_msat),
            payment_hash: payment_hash.to_string(),
            preimage: None,
            payment_request: invoice.to_string(),
            description: String::new(),
            description_hash: String::new(),
            expires_at: None,
        },
        now,
    )
    .await
    .map_err(|err| match err {
        DatabaseError::AlreadyExists { .. } => ServiceError::Backend(BackendError::PaymentFailed(
            "a payment for this invoice is already in progress".to_string(),
        )),
        other => other.into(),
    })?;

    db_tx.commit().await?;
    Ok(created)
}

async fn settle(
    ctx: &ServiceContext,
    pending: &Transaction,
    preimage: &str,
    fee_msat: u64,
) -> Result<Transaction, ServiceError> {
    let fee_msat = i64::try_from(fee_msat).map_err(|_| ServiceError::Internal("fee overflow".to_string()))?;
    if fee_msat > pending.fee_reserve_msat {
        error!(
            payment_hash = %pending.payment_hash,
            fee_msat,
            fee_reserve_msat = pending.fee_reserve_msat,
            "Node paid more in fees than the reserve allowed"
        );
    }
    let settled = transaction::mark_settled_and_charge(
        ctx.pool(),
        Direction::Outgoing,
        &pending.payment_hash,
        preimage,
        fee_msat,
        unix_timestamp(),
    )
    .await;

    match settled {
        Ok(settled) => Ok(settled),
        // Reconciliation got there first.
        Err(DatabaseError::NotPending { .. }) => {
            Ok(transaction::get_transaction(ctx.pool(), pending.id).await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Errors after which the node will not complete the payment.
fn is_final(err: &BackendError) -> bool {
    matches!(
        err,
        BackendError::PaymentFailed(_)
            | BackendError::AlreadyPaid
            | BackendError::InsufficientBalance
            | BackendError::InvalidInvoice(_)
            | BackendError::InvalidAmount(_)
    )
}
