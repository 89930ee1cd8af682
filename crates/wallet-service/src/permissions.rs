//! Permission and budget engine.
//!
//! Checks run in order: app expiry, granted scope, amount budget, isolated
//! balance. Budget usage is only charged when a payment settles, so the
//! budget check counts funds held by in-flight payments as already spent.
//! A spend must also fit its own fee reserve, which caps the routing fee the
//! node may pay for it.

use database::{permission, transaction, App, DatabaseError};
use nip47::{ErrorCode, Method};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::debug;

/// Smallest routing fee held back while a payment is in flight.
pub const MIN_FEE_RESERVE_MSAT: i64 = 10_000;

/// Routing fee held back for an in-flight payment: 1% with a 10 sat floor.
pub fn fee_reserve_msat(amount_msat: i64) -> i64 {
    (amount_msat / 100).max(MIN_FEE_RESERVE_MSAT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Deny {
    #[error("app connection has expired")]
    Expired,
    #[error("app does not have permission for this method")]
    ScopeMissing,
    #[error("insufficient budget remaining to make payment")]
    BudgetExceeded,
    #[error("insufficient isolated balance to make payment")]
    InsufficientIsolatedBalance,
}

impl Deny {
    pub fn code(&self) -> ErrorCode {
        match self {
            Deny::Expired => ErrorCode::Unauthorized,
            Deny::ScopeMissing => ErrorCode::Restricted,
            Deny::BudgetExceeded | Deny::InsufficientIsolatedBalance => ErrorCode::QuotaExceeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny(Deny),
}

impl Authorization {
    pub fn into_result(self) -> Result<(), Deny> {
        match self {
            Authorization::Allow => Ok(()),
            Authorization::Deny(deny) => Err(deny),
        }
    }
}

/// Run the checks on `conn`.
///
/// Rolling an expired budget period over is a write, so callers that need
/// the decision to hold until their own insert commits pass the connection
/// of an open SQL transaction.
pub async fn check(
    conn: &mut SqliteConnection,
    app: &App,
    method: Method,
    amount_msat: Option<i64>,
    now: i64,
) -> Result<Authorization, DatabaseError> {
    if app.is_expired(now) {
        return Ok(Authorization::Deny(Deny::Expired));
    }

    let Some(grant) = permission::get_grant(&mut *conn, app.id, method.as_str()).await? else {
        return Ok(Authorization::Deny(Deny::ScopeMissing));
    };

    let Some(amount) = amount_msat else {
        return Ok(Authorization::Allow);
    };

    let (reserved, fee_reserve) = if method.is_spend() {
        (
            transaction::sum_reserved(&mut *conn, app.id).await?,
            fee_reserve_msat(amount),
        )
    } else {
        (0, 0)
    };

    if let Some(max_amount) = grant.max_amount_msat {
        let grant = permission::rollover_if_expired(&mut *conn, grant, now).await?;
        if grant.usage_msat + reserved + amount + fee_reserve > max_amount {
            debug!(
                app_id = app.id,
                usage = grant.usage_msat,
                reserved,
                amount,
                fee_reserve,
                max_amount,
                "Budget exceeded"
            );
            return Ok(Authorization::Deny(Deny::BudgetExceeded));
        }
    }

    if app.isolated && method.is_spend() {
        let balance = transaction::sum_isolated_balance(&mut *conn, app.id).await?;
        if balance - reserved < amount + fee_reserve {
            debug!(app_id = app.id, balance, reserved, amount, "Isolated balance too low");
            return Ok(Authorization::Deny(Deny::InsufficientIsolatedBalance));
        }
    }

    Ok(Authorization::Allow)
}

/// Advisory check in its own SQL transaction.
pub async fn authorize(
    pool: &SqlitePool,
    app: &App,
    method: Method,
    amount_msat: Option<i64>,
    now: i64,
) -> Result<Authorization, DatabaseError> {
    let mut tx = pool.begin().await?;
    let decision = check(&mut *tx, app, method, amount_msat, now).await?;
    tx.commit().await?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::app::{self, NewApp};
    use database::transaction::{self as ledger, NewTransaction};
    use database::{BudgetRenewal, Database, Direction};

    const NOW: i64 = 1_000_000;

    async fn setup(isolated: bool, budget: Option<(i64, BudgetRenewal)>) -> (Database, App) {
        let db = Database::connect_in_memory().await.unwrap();
        let app = app::create_app(
            db.pool(),
            &NewApp {
                name: "test".to_string(),
                pubkey: "ab".repeat(32),
                isolated,
                expires_at: None,
                scopes: vec!["pay_invoice".to_string(), "get_balance".to_string()],
                budget,
            },
            NOW,
        )
        .await
        .unwrap();
        (db, app)
    }

    async fn settled_incoming(db: &Database, app_id: i64, hash: &str, amount: i64) {
        ledger::create_pending_transaction(
            db.pool(),
            &NewTransaction {
                app_id: Some(app_id),
                request_event_id: None,
                direction: Direction::Incoming,
                amount_msat: amount,
                fee_reserve_msat: 0,
                payment_hash: hash.to_string(),
                preimage: Some("11".repeat(32)),
                payment_request: String::new(),
                description: String::new(),
                description_hash: String::new(),
                expires_at: None,
            },
            NOW,
        )
        .await
        .unwrap();
        ledger::mark_settled_and_charge(db.pool(), Direction::Incoming, hash, "", 0, NOW)
            .await
            .unwrap();
    }

    async fn pending_outgoing(db: &Database, app_id: i64, hash: &str, amount: i64) {
        ledger::create_pending_transaction(
            db.pool(),
            &NewTransaction {
                app_id: Some(app_id),
                request_event_id: None,
                direction: Direction::Outgoing,
                amount_msat: amount,
                fee_reserve_msat: fee_reserve_msat(amount),
                payment_hash: hash.to_string(),
                preimage: None,
                payment_request: String::new(),
                description: String::new(),
                description_hash: String::new(),
                expires_at: None,
            },
            NOW,
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_fee_reserve() {
        assert_eq!(fee_reserve_msat(1_000), 10_000);
        assert_eq!(fee_reserve_msat(1_000_000), 10_000);
        assert_eq!(fee_reserve_msat(5_000_000), 50_000);
    }

    #[tokio::test]
    async fn test_missing_scope() {
        let (db, app) = setup(false, None).await;
        let decision = authorize(db.pool(), &app, Method::MakeInvoice, Some(1), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::ScopeMissing));

        let decision = authorize(db.pool(), &app, Method::GetBalance, None, NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);
    }

    #[tokio::test]
    async fn test_expired_app() {
        let (db, mut app) = setup(false, None).await;
        app.expires_at = Some(NOW);
        let decision = authorize(db.pool(), &app, Method::GetBalance, None, NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::Expired));
    }

    #[tokio::test]
    async fn test_budget_counts_reserved_payments() {
        let (db, app) = setup(false, Some((100_000, BudgetRenewal::Never))).await;

        // The payment's own 10_000 fee reserve counts against the budget.
        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(90_000), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);

        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(90_001), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::BudgetExceeded));

        // 50_000 in flight holds 60_000 including the fee reserve.
        pending_outgoing(&db, app.id, &"01".repeat(32), 50_000).await;
        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(30_000), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);
        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(30_001), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::BudgetExceeded));
    }

    #[tokio::test]
    async fn test_budget_renews_after_period() {
        let (db, app) = setup(false, Some((100_000, BudgetRenewal::Daily))).await;
        let grant = permission::get_grant(db.pool(), app.id, "pay_invoice")
            .await
            .unwrap()
            .unwrap();
        permission::add_usage(db.pool(), grant.id, 100_000).await.unwrap();

        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(1), NOW + 10)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::BudgetExceeded));

        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(1), NOW + 86_400)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);
    }

    #[tokio::test]
    async fn test_isolated_balance_includes_fee_reserve() {
        let (db, app) = setup(true, None).await;
        settled_incoming(&db, app.id, &"02".repeat(32), 100_000).await;

        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(90_000), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);

        let decision = authorize(db.pool(), &app, Method::PayInvoice, Some(90_001), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Deny(Deny::InsufficientIsolatedBalance));

        // Non-spend methods never consult the isolated balance.
        let decision = authorize(db.pool(), &app, Method::GetBalance, Some(1_000_000), NOW)
            .await
            .unwrap();
        assert_eq!(decision, Authorization::Allow);
    }
}
