//! Permission grants and budget accounting.

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{BudgetRenewal, PermissionGrant};

const GRANT_COLUMNS: &str =
    "id, app_id, scope, max_amount_msat, budget_renewal, usage_msat, period_start";

/// A scope to grant to an app.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub scope: String,
    pub max_amount_msat: Option<i64>,
    pub budget_renewal: BudgetRenewal,
}

/// Insert a grant. The budget period starts at `now`.
pub async fn insert_grant<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app_id: i64,
    grant: &NewGrant,
    now: i64,
) -> Result<PermissionGrant> {
    sqlx::query_as::<_, PermissionGrant>(&format!(
        r#"
        INSERT INTO app_permissions (app_id, scope, max_amount_msat, budget_renewal, usage_msat, period_start)
        VALUES (?, ?, ?, ?, 0, ?)
        RETURNING {GRANT_COLUMNS}
        "#
    ))
    .bind(app_id)
    .bind(&grant.scope)
    .bind(grant.max_amount_msat)
    .bind(grant.budget_renewal.as_str())
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "PermissionGrant", &format!("{app_id}/{}", grant.scope)))
}

/// All grants of an app, ordered by scope.
pub async fn list_grants<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app_id: i64,
) -> Result<Vec<PermissionGrant>> {
    let grants = sqlx::query_as::<_, PermissionGrant>(&format!(
        "SELECT {GRANT_COLUMNS} FROM app_permissions WHERE app_id = ? ORDER BY scope"
    ))
    .bind(app_id)
    .fetch_all(executor)
    .await?;

    Ok(grants)
}

/// The grant for one scope, if the app has it.
pub async fn get_grant<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app_id: i64,
    scope: &str,
) -> Result<Option<PermissionGrant>> {
    let grant = sqlx::query_as::<_, PermissionGrant>(&format!(
        "SELECT {GRANT_COLUMNS} FROM app_permissions WHERE app_id = ? AND scope = ?"
    ))
    .bind(app_id)
    .bind(scope)
    .fetch_optional(executor)
    .await?;

    Ok(grant)
}

/// Reset usage and advance the period start if the grant's period has elapsed.
///
/// Returns the grant as it stands after the rollover.
pub async fn rollover_if_expired(
    conn: &mut SqliteConnection,
    grant: PermissionGrant,
    now: i64,
) -> Result<PermissionGrant> {
    let Some(period_start) = grant
        .budget_renewal
        .rolled_period_start(grant.period_start, now)
    else {
        return Ok(grant);
    };

    sqlx::query("UPDATE app_permissions SET usage_msat = 0, period_start = ? WHERE id = ?")
        .bind(period_start)
        .bind(grant.id)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(
        grant_id = grant.id,
        scope = %grant.scope,
        period_start,
        "Budget period renewed"
    );

    Ok(PermissionGrant {
        usage_msat: 0,
        period_start,
        ..grant
    })
}

/// Load a grant with its period rolled forward to `now`, in one transaction.
pub async fn current_grant(
    pool: &SqlitePool,
    app_id: i64,
    scope: &str,
    now: i64,
) -> Result<Option<PermissionGrant>> {
    let mut tx = pool.begin().await?;
    let grant = match get_grant(&mut *tx, app_id, scope).await? {
        Some(grant) => Some(rollover_if_expired(&mut *tx, grant, now).await?),
        None => None,
    };
    tx.commit().await?;
    Ok(grant)
}

/// Add settled spend to a grant's usage counter.
pub async fn add_usage<'e, E: SqliteExecutor<'e>>(
    executor: E,
    grant_id: i64,
    amount_msat: i64,
) -> Result<()> {
    sqlx::query("UPDATE app_permissions SET usage_msat = usage_msat + ? WHERE id = ?")
        .bind(amount_msat)
        .bind(grant_id)
        .execute(executor)
        .await?;
    Ok(())
}
