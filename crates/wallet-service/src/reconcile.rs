//! Resolves pending ledger rows against the node.
//!
//! A payment whose backend call timed out, or an invoice paid while nobody
//! was asking, is still `pending` in the ledger. Rows are refreshed when an
//! app looks them up and by a periodic sweep that also runs at startup.

use std::sync::Arc;

use database::{transaction, unix_timestamp, DatabaseError, Direction, Transaction, TransactionState};
use node_core::{BackendError, InvoiceState};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::context::ServiceContext;
use crate::error::ServiceError;

/// Incoming invoices stop being swept this long after they expire.
const EXPIRED_INVOICE_GRACE_SECS: i64 = 3_600;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub settled: usize,
    pub failed: usize,
}

/// Bring one row up to date with the node. Terminal rows come back unchanged.
///
/// Incoming invoices the node reports as failed (expired) stay pending; an
/// outgoing payment is only failed when the node says so.
pub async fn refresh(ctx: &ServiceContext, tx: Transaction) -> Result<Transaction, ServiceError> {
    if tx.state != TransactionState::Pending || tx.payment_hash.is_empty() {
        return Ok(tx);
    }

    let payment_hash = tx.payment_hash.clone();
    let status = match ctx
        .call(move |node| async move { node.lookup_invoice(&payment_hash).await })
        .await
    {
        Ok(status) => status,
        Err(BackendError::NotFound(_)) => {
            debug!(payment_hash = %tx.payment_hash, "Node does not know payment yet");
            return Ok(tx);
        }
        Err(err) => return Err(err.into()),
    };

    let now = unix_timestamp();
    let resolved = match status.state {
        InvoiceState::Pending => return Ok(tx),
        InvoiceState::Settled => {
            let preimage = status.preimage.unwrap_or_default();
            if preimage.is_empty() && tx.preimage.is_none() {
                warn!(payment_hash = %tx.payment_hash, "Node reports settled without preimage");
                return Ok(tx);
            }
            let fee_msat = match tx.direction {
                Direction::Incoming => 0,
                Direction::Outgoing => i64::try_from(status.fee_msat).unwrap_or(i64::MAX),
            };
            transaction::mark_settled_and_charge(
                ctx.pool(),
                tx.direction,
                &tx.payment_hash,
                &preimage,
                fee_msat,
                status.settled_at.unwrap_or(now),
            )
            .await
        }
        InvoiceState::Failed if tx.direction == Direction::Incoming => return Ok(tx),
        InvoiceState::Failed => {
            let mut conn = ctx.pool().acquire().await.map_err(DatabaseError::from)?;
            transaction::mark_failed(
                &mut *conn,
                Direction::Outgoing,
                &tx.payment_hash,
                "payment failed",
                now,
            )
            .await
        }
    };

    match resolved {
        Ok(updated) => {
            info!(
                transaction_id = updated.id,
                payment_hash = %updated.payment_hash,
                state = updated.state.as_str(),
                "Reconciled transaction"
            );
            Ok(updated)
        }
        Err(DatabaseError::NotPending { .. }) => {
            Ok(transaction::get_transaction(ctx.pool(), tx.id).await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Refresh every pending row once.
pub async fn sweep(ctx: &ServiceContext) -> Result<SweepSummary, DatabaseError> {
    let now = unix_timestamp();
    let pending = transaction::list_pending(ctx.pool()).await?;
    let mut summary = SweepSummary::default();

    for tx in pending {
        let stale_invoice = tx.direction == Direction::Incoming
            && tx
                .expires_at
                .is_some_and(|expires_at| expires_at + EXPIRED_INVOICE_GRACE_SECS < now);
        if stale_invoice {
            continue;
        }

        summary.checked += 1;
        let payment_hash = tx.payment_hash.clone();
        match refresh(ctx, tx).await {
            Ok(updated) => match updated.state {
                TransactionState::Settled => summary.settled += 1,
                TransactionState::Failed => summary.failed += 1,
                TransactionState::Pending => {}
            },
            Err(err) => {
                warn!(payment_hash = %payment_hash, error = %err, "Failed to reconcile transaction");
            }
        }
    }

    if summary.settled > 0 || summary.failed > 0 {
        info!(
            checked = summary.checked,
            settled = summary.settled,
            failed = summary.failed,
            "Reconciliation sweep finished"
        );
    }
    Ok(summary)
}

/// Sweep now and then every `reconcile_interval`.
pub async fn run(ctx: Arc<ServiceContext>) {
    let mut ticker = tokio::time::interval(ctx.config.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(err) = sweep(&ctx).await {
            error!(error = %err, "Reconciliation sweep failed");
        }
    }
}
