//! Payment and invoice ledger.
//!
//! Rows are created `pending` and move exactly once to `settled` or
//! `failed`. Every state change is a single `UPDATE ... WHERE state =
//! 'pending'`, so terminal rows are never rewritten and readers never see a
//! half-applied settlement.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor, SqlitePool};

use crate::app::SPEND_SCOPE;
use crate::error::{DatabaseError, Result};
use crate::models::{Direction, Transaction, TransactionState};
use crate::permission;

const TRANSACTION_COLUMNS: &str = "id, app_id, request_event_id, type, state, amount_msat, \
     fee_msat, fee_reserve_msat, payment_hash, preimage, payment_request, description, \
     description_hash, failure_reason, created_at, updated_at, settled_at, expires_at";

/// Fields needed to record a new pending transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub app_id: Option<i64>,
    pub request_event_id: Option<i64>,
    pub direction: Direction,
    pub amount_msat: i64,
    /// Fee held back while an outgoing payment is in flight.
    pub fee_reserve_msat: i64,
    pub payment_hash: String,
    /// Preimage known in advance. Only kept for incoming rows.
    pub preimage: Option<String>,
    pub payment_request: String,
    pub description: String,
    pub description_hash: String,
    pub expires_at: Option<i64>,
}

/// Which lifecycle states a query returns.
///
/// Exactly one variant applies per query. The default returns settled rows
/// only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StateFilter {
    #[default]
    Paid,
    States(Vec<TransactionState>),
    /// Pending rows in either direction.
    Unpaid,
    UnpaidIncoming,
    UnpaidOutgoing,
}

/// Ledger query. All fields are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Restrict to one app's attributed rows.
    pub app_id: Option<i64>,
    pub direction: Option<Direction>,
    pub state: StateFilter,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<i64>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    /// A filter over one app's rows.
    pub fn for_app(app_id: i64) -> Self {
        Self {
            app_id: Some(app_id),
            ..Default::default()
        }
    }

    fn push_conditions<'a>(&'a self, builder: &mut QueryBuilder<'a, Sqlite>) {
        builder.push(" WHERE 1 = 1");

        if let Some(app_id) = self.app_id {
            builder.push(" AND app_id = ").push_bind(app_id);
        }

        // Direction implied by the unpaid variants is ANDed with any explicit
        // direction, so `type=incoming` plus `unpaid_outgoing` matches nothing.
        if let Some(direction) = self.direction {
            builder.push(" AND type = ").push_bind(direction.as_str());
        }

        match &self.state {
            StateFilter::Paid => {
                builder.push(" AND state = 'settled'");
            }
            StateFilter::Unpaid => {
                builder.push(" AND state = 'pending'");
            }
            StateFilter::UnpaidIncoming => {
                builder.push(" AND state = 'pending' AND type = 'incoming'");
            }
            StateFilter::UnpaidOutgoing => {
                builder.push(" AND state = 'pending' AND type = 'outgoing'");
            }
            StateFilter::States(states) if states.is_empty() => {
                builder.push(" AND 1 = 0");
            }
            StateFilter::States(states) => {
                builder.push(" AND state IN (");
                let mut separated = builder.separated(", ");
                for state in states {
                    separated.push_bind(state.as_str());
                }
                separated.push_unseparated(")");
            }
        }

        if let Some(from) = self.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(until) = self.until {
            builder.push(" AND created_at < ").push_bind(until);
        }
    }
}

/// Record a new pending transaction.
pub async fn create_pending_transaction<'e, E: SqliteExecutor<'e>>(
    executor: E,
    new: &NewTransaction,
    now: i64,
) -> Result<Transaction> {
    let preimage = match new.direction {
        Direction::Incoming => new.preimage.as_deref(),
        Direction::Outgoing => None,
    };

    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        INSERT INTO transactions (
            app_id, request_event_id, type, state, amount_msat, fee_msat, fee_reserve_msat,
            payment_hash, preimage, payment_request, description, description_hash,
            created_at, updated_at, expires_at
        )
        VALUES (?, ?, ?, 'pending', ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(new.app_id)
    .bind(new.request_event_id)
    .bind(new.direction.as_str())
    .bind(new.amount_msat)
    .bind(new.fee_reserve_msat)
    .bind(&new.payment_hash)
    .bind(preimage)
    .bind(&new.payment_request)
    .bind(&new.description)
    .bind(&new.description_hash)
    .bind(now)
    .bind(now)
    .bind(new.expires_at)
    .fetch_one(executor)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "Transaction", &new.payment_hash))
}

/// Move the pending row for `payment_hash` to `settled`.
///
/// An empty `preimage` keeps the one stored at creation (incoming invoices
/// issued with a known preimage).
pub async fn mark_settled(
    conn: &mut SqliteConnection,
    direction: Direction,
    payment_hash: &str,
    preimage: &str,
    fee_msat: i64,
    settled_at: i64,
) -> Result<Transaction> {
    let settled = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        UPDATE transactions
        SET state = 'settled',
            preimage = COALESCE(NULLIF(?, ''), preimage),
            fee_msat = ?,
            fee_reserve_msat = 0,
            settled_at = ?,
            updated_at = ?
        WHERE type = ? AND payment_hash = ? AND state = 'pending'
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(preimage)
    .bind(fee_msat)
    .bind(settled_at)
    .bind(settled_at)
    .bind(direction.as_str())
    .bind(payment_hash)
    .fetch_optional(&mut *conn)
    .await?;

    match settled {
        Some(tx) => {
            tracing::debug!(
                transaction_id = tx.id,
                payment_hash = %payment_hash,
                "Transaction settled"
            );
            Ok(tx)
        }
        None => Err(not_pending(conn, direction, payment_hash).await),
    }
}

/// Settle a row and, for outgoing payments, charge amount plus fee against
/// the owning app's spend budget in the same SQL transaction.
pub async fn mark_settled_and_charge(
    pool: &SqlitePool,
    direction: Direction,
    payment_hash: &str,
    preimage: &str,
    fee_msat: i64,
    settled_at: i64,
) -> Result<Transaction> {
    let mut db_tx = pool.begin().await?;
    let settled = mark_settled(
        &mut *db_tx,
        direction,
        payment_hash,
        preimage,
        fee_msat,
        settled_at,
    )
    .await?;

    if let (Direction::Outgoing, Some(app_id)) = (settled.direction, settled.app_id) {
        if let Some(grant) = permission::get_grant(&mut *db_tx, app_id, SPEND_SCOPE).await? {
            let grant = permission::rollover_if_expired(&mut *db_tx, grant, settled_at).await?;
            permission::add_usage(
                &mut *db_tx,
                grant.id,
                settled.amount_msat + settled.fee_msat,
            )
            .await?;
        }
    }

    db_tx.commit().await?;
    Ok(settled)
}

/// Move the pending row for `payment_hash` to `failed`.
pub async fn mark_failed(
    conn: &mut SqliteConnection,
    direction: Direction,
    payment_hash: &str,
    reason: &str,
    now: i64,
) -> Result<Transaction> {
    let failed = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        UPDATE transactions
        SET state = 'failed',
            failure_reason = ?,
            fee_reserve_msat = 0,
            updated_at = ?
        WHERE type = ? AND payment_hash = ? AND state = 'pending'
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(reason)
    .bind(now)
    .bind(direction.as_str())
    .bind(payment_hash)
    .fetch_optional(&mut *conn)
    .await?;

    match failed {
        Some(tx) => {
            tracing::debug!(
                transaction_id = tx.id,
                payment_hash = %payment_hash,
                reason = %reason,
                "Transaction failed"
            );
            Ok(tx)
        }
        None => Err(not_pending(conn, direction, payment_hash).await),
    }
}

async fn not_pending(
    conn: &mut SqliteConnection,
    direction: Direction,
    payment_hash: &str,
) -> DatabaseError {
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM transactions WHERE type = ? AND payment_hash = ?",
    )
    .bind(direction.as_str())
    .bind(payment_hash)
    .fetch_one(&mut *conn)
    .await;

    match exists {
        Ok(0) => DatabaseError::NotFound {
            entity: "Transaction",
            id: payment_hash.to_string(),
        },
        Ok(_) => DatabaseError::NotPending {
            payment_hash: payment_hash.to_string(),
        },
        Err(e) => DatabaseError::Sqlx(e),
    }
}

/// Run a ledger query. Results are newest first by settlement or last
/// update, ties broken by id.
pub async fn query_transactions<'e, E: SqliteExecutor<'e>>(
    executor: E,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions"
    ));
    filter.push_conditions(&mut builder);
    builder.push(" ORDER BY COALESCE(settled_at, updated_at) DESC, id DESC");

    // SQLite needs a LIMIT before OFFSET; -1 means no limit.
    if filter.limit.is_some() || filter.offset.is_some() {
        builder
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));
    }

    let rows = builder
        .build_query_as::<Transaction>()
        .fetch_all(executor)
        .await?;

    Ok(rows)
}

/// Settled incoming minus settled outgoing (amount + fee) for one app.
///
/// Rows attributed to no app or to other apps never count.
pub async fn sum_isolated_balance<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app_id: i64,
) -> Result<i64> {
    let balance = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(CASE
            WHEN type = 'incoming' THEN amount_msat
            ELSE -(amount_msat + fee_msat)
        END), 0)
        FROM transactions
        WHERE app_id = ? AND state = 'settled'
        "#,
    )
    .bind(app_id)
    .fetch_one(executor)
    .await?;

    Ok(balance)
}

/// Funds held by an app's in-flight outgoing payments (amount + fee reserve).
pub async fn sum_reserved<'e, E: SqliteExecutor<'e>>(executor: E, app_id: i64) -> Result<i64> {
    let reserved = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(amount_msat + fee_reserve_msat), 0)
        FROM transactions
        WHERE app_id = ? AND type = 'outgoing' AND state = 'pending'
        "#,
    )
    .bind(app_id)
    .fetch_one(executor)
    .await?;

    Ok(reserved)
}

/// Latest row with `payment_hash` attributed to `app_id`.
pub async fn find_for_app<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app_id: i64,
    payment_hash: &str,
) -> Result<Option<Transaction>> {
    let tx = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS} FROM transactions
        WHERE app_id = ? AND payment_hash = ?
        ORDER BY id DESC
        LIMIT 1
        "#
    ))
    .bind(app_id)
    .bind(payment_hash)
    .fetch_optional(executor)
    .await?;

    Ok(tx)
}

/// Whether any app already paid this hash successfully.
pub async fn has_settled_outgoing<'e, E: SqliteExecutor<'e>>(
    executor: E,
    payment_hash: &str,
) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM transactions
        WHERE type = 'outgoing' AND state = 'settled' AND payment_hash = ?
        "#,
    )
    .bind(payment_hash)
    .fetch_one(executor)
    .await?;

    Ok(count > 0)
}

/// Fetch one row by id.
pub async fn get_transaction<'e, E: SqliteExecutor<'e>>(executor: E, id: i64) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Transaction",
        id: id.to_string(),
    })
}

/// All pending rows, oldest first. Input to reconciliation.
pub async fn list_pending<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS} FROM transactions
        WHERE state = 'pending' AND payment_hash != ''
        ORDER BY id ASC
        "#
    ))
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{self, NewApp};
    use crate::models::BudgetRenewal;
    use crate::Database;

    async fn test_app(db: &Database, pubkey_byte: &str, budget: Option<i64>) -> i64 {
        let new_app = NewApp {
            name: format!("app-{pubkey_byte}"),
            pubkey: pubkey_byte.repeat(32),
            isolated: true,
            expires_at: None,
            scopes: vec![SPEND_SCOPE.to_string()],
            budget: budget.map(|max| (max, BudgetRenewal::Never)),
        };
        app::create_app(db.pool(), &new_app, 0).await.unwrap().id
    }

    fn new_tx(app_id: Option<i64>, direction: Direction, hash: &str, amount: i64) -> NewTransaction {
        NewTransaction {
            app_id,
            request_event_id: None,
            direction,
            amount_msat: amount,
            fee_reserve_msat: 0,
            payment_hash: hash.to_string(),
            preimage: None,
            payment_request: format!("lnbcrt-{hash}"),
            description: String::new(),
            description_hash: String::new(),
            expires_at: None,
        }
    }

    async fn settle(db: &Database, direction: Direction, hash: &str, at: i64) -> Transaction {
        let mut conn = db.pool().acquire().await.unwrap();
        mark_settled(&mut *conn, direction, hash, "ff", 0, at)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_settle_is_terminal() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "01", None).await;
        create_pending_transaction(db.pool(), &new_tx(Some(app_id), Direction::Outgoing, "h1", 100), 10)
            .await
            .unwrap();

        let settled = settle(&db, Direction::Outgoing, "h1", 20).await;
        assert_eq!(settled.state, TransactionState::Settled);
        assert_eq!(settled.settled_at, Some(20));
        assert_eq!(settled.preimage.as_deref(), Some("ff"));
        assert_eq!(get_transaction(db.pool(), settled.id).await.unwrap(), settled);

        let mut conn = db.pool().acquire().await.unwrap();
        let again = mark_failed(&mut *conn, Direction::Outgoing, "h1", "late", 30).await;
        assert!(matches!(again, Err(DatabaseError::NotPending { .. })));
        let missing = mark_failed(&mut *conn, Direction::Outgoing, "nope", "x", 30).await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_outgoing_hash_reuse_after_failure_only() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "02", None).await;
        let attempt = new_tx(Some(app_id), Direction::Outgoing, "h2", 100);

        create_pending_transaction(db.pool(), &attempt, 1).await.unwrap();
        let dup = create_pending_transaction(db.pool(), &attempt, 2).await;
        assert!(matches!(dup, Err(DatabaseError::AlreadyExists { .. })));

        let mut conn = db.pool().acquire().await.unwrap();
        mark_failed(&mut *conn, Direction::Outgoing, "h2", "no route", 3)
            .await
            .unwrap();
        drop(conn);

        let retry = create_pending_transaction(db.pool(), &attempt, 4).await.unwrap();
        assert_eq!(retry.state, TransactionState::Pending);
        assert_eq!(retry.preimage, None);
    }

    #[tokio::test]
    async fn test_isolated_balance_ignores_other_rows() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "03", None).await;
        let other_id = test_app(&db, "04", None).await;

        for (owner, hash) in [(Some(app_id), "in-mine"), (None, "in-nobody"), (Some(other_id), "in-other")] {
            create_pending_transaction(db.pool(), &new_tx(owner, Direction::Incoming, hash, 1_000), 1)
                .await
                .unwrap();
            settle(&db, Direction::Incoming, hash, 2).await;
        }

        let mut spend = new_tx(Some(app_id), Direction::Outgoing, "out-mine", 300);
        spend.fee_reserve_msat = 10_000;
        create_pending_transaction(db.pool(), &spend, 3).await.unwrap();

        assert_eq!(sum_isolated_balance(db.pool(), app_id).await.unwrap(), 1_000);
        assert_eq!(sum_reserved(db.pool(), app_id).await.unwrap(), 10_300);

        let mut conn = db.pool().acquire().await.unwrap();
        mark_settled(&mut *conn, Direction::Outgoing, "out-mine", "aa", 5, 4)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(sum_isolated_balance(db.pool(), app_id).await.unwrap(), 695);
        assert_eq!(sum_reserved(db.pool(), app_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settle_and_charge_updates_usage() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "05", Some(50_000)).await;
        create_pending_transaction(db.pool(), &new_tx(Some(app_id), Direction::Outgoing, "h5", 20_000), 1)
            .await
            .unwrap();

        mark_settled_and_charge(db.pool(), Direction::Outgoing, "h5", "bb", 100, 2)
            .await
            .unwrap();

        let grant = permission::get_grant(db.pool(), app_id, SPEND_SCOPE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(grant.usage_msat, 20_100);
    }

    #[tokio::test]
    async fn test_filter_precedence_and_order() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "06", None).await;
        let other_id = test_app(&db, "07", None).await;

        create_pending_transaction(db.pool(), &new_tx(Some(app_id), Direction::Incoming, "pin", 1), 1)
            .await
            .unwrap();
        create_pending_transaction(db.pool(), &new_tx(Some(app_id), Direction::Outgoing, "pout", 2), 2)
            .await
            .unwrap();
        for (i, hash) in ["s1", "s2", "s3"].iter().enumerate() {
            create_pending_transaction(db.pool(), &new_tx(Some(app_id), Direction::Incoming, hash, 3), 3)
                .await
                .unwrap();
            settle(&db, Direction::Incoming, hash, 10 + i as i64).await;
        }
        create_pending_transaction(db.pool(), &new_tx(Some(other_id), Direction::Incoming, "foreign", 4), 3)
            .await
            .unwrap();
        settle(&db, Direction::Incoming, "foreign", 50).await;

        let hashes = |rows: Vec<Transaction>| {
            rows.into_iter().map(|t| t.payment_hash).collect::<Vec<_>>()
        };
        let base = TransactionFilter::for_app(app_id);

        let paid = query_transactions(db.pool(), &base).await.unwrap();
        assert_eq!(hashes(paid), vec!["s3", "s2", "s1"]);

        let unpaid_out = TransactionFilter {
            state: StateFilter::UnpaidOutgoing,
            ..base.clone()
        };
        assert_eq!(hashes(query_transactions(db.pool(), &unpaid_out).await.unwrap()), vec!["pout"]);

        let unpaid_in = TransactionFilter {
            state: StateFilter::UnpaidIncoming,
            ..base.clone()
        };
        assert_eq!(hashes(query_transactions(db.pool(), &unpaid_in).await.unwrap()), vec!["pin"]);

        let unpaid = TransactionFilter {
            state: StateFilter::Unpaid,
            ..base.clone()
        };
        assert_eq!(query_transactions(db.pool(), &unpaid).await.unwrap().len(), 2);

        let paged = TransactionFilter {
            limit: Some(1),
            offset: Some(1),
            ..base.clone()
        };
        assert_eq!(hashes(query_transactions(db.pool(), &paged).await.unwrap()), vec!["s2"]);

        let windowed = TransactionFilter {
            state: StateFilter::States(vec![TransactionState::Pending, TransactionState::Settled]),
            from: Some(2),
            until: Some(3),
            ..base.clone()
        };
        assert_eq!(hashes(query_transactions(db.pool(), &windowed).await.unwrap()), vec!["pout"]);

        let first = query_transactions(db.pool(), &base).await.unwrap();
        let second = query_transactions(db.pool(), &base).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_incoming_keeps_issued_preimage() {
        let db = Database::connect_in_memory().await.unwrap();
        let app_id = test_app(&db, "08", None).await;
        let mut invoice = new_tx(Some(app_id), Direction::Incoming, "h8", 500);
        invoice.preimage = Some("cafe".to_string());
        create_pending_transaction(db.pool(), &invoice, 1).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let settled = mark_settled(&mut *conn, Direction::Incoming, "h8", "", 0, 5)
            .await
            .unwrap();
        assert_eq!(settled.preimage.as_deref(), Some("cafe"));

        assert!(!has_settled_outgoing(&mut *conn, "h8").await.unwrap());
        let found = find_for_app(&mut *conn, app_id, "h8").await.unwrap().unwrap();
        assert_eq!(found.id, settled.id);
        assert!(list_pending(&mut *conn).await.unwrap().is_empty());
    }
}
