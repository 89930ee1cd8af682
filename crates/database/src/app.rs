//! App registration and lookup.

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{App, BudgetRenewal};
use crate::permission::{self, NewGrant};

const APP_COLUMNS: &str = "id, name, pubkey, isolated, disabled, created_at, expires_at";

/// Fields needed to register an app.
#[derive(Debug, Clone)]
pub struct NewApp {
    pub name: String,
    pub pubkey: String,
    pub isolated: bool,
    pub expires_at: Option<i64>,
    /// Scopes granted to the app. `budget` applies to the spend scope only.
    pub scopes: Vec<String>,
    /// Optional `(max_amount_msat, renewal)` cap for `pay_invoice`.
    pub budget: Option<(i64, BudgetRenewal)>,
}

/// Scope name that carries the app's spending budget.
pub const SPEND_SCOPE: &str = "pay_invoice";

/// Insert an app row.
pub async fn insert_app<'e, E: SqliteExecutor<'e>>(
    executor: E,
    app: &NewApp,
    now: i64,
) -> Result<App> {
    sqlx::query_as::<_, App>(&format!(
        r#"
        INSERT INTO apps (name, pubkey, isolated, disabled, created_at, expires_at)
        VALUES (?, ?, ?, 0, ?, ?)
        RETURNING {APP_COLUMNS}
        "#
    ))
    .bind(&app.name)
    .bind(&app.pubkey)
    .bind(app.isolated)
    .bind(now)
    .bind(app.expires_at)
    .fetch_one(executor)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "App", &app.pubkey))
}

/// Register an app together with its grants in one transaction.
pub async fn create_app(pool: &SqlitePool, app: &NewApp, now: i64) -> Result<App> {
    let mut tx = pool.begin().await?;
    let created = insert_app(&mut *tx, app, now).await?;
    grant_scopes(&mut *tx, created.id, app, now).await?;
    tx.commit().await?;

    tracing::info!(app_id = created.id, pubkey = %created.pubkey, "Registered app");
    Ok(created)
}

async fn grant_scopes(
    conn: &mut SqliteConnection,
    app_id: i64,
    app: &NewApp,
    now: i64,
) -> Result<()> {
    for scope in &app.scopes {
        let (max_amount_msat, budget_renewal) = match app.budget {
            Some((max, renewal)) if scope == SPEND_SCOPE => (Some(max), renewal),
            _ => (None, BudgetRenewal::Never),
        };
        let grant = NewGrant {
            scope: scope.clone(),
            max_amount_msat,
            budget_renewal,
        };
        permission::insert_grant(&mut *conn, app_id, &grant, now).await?;
    }
    Ok(())
}

/// Get an app by ID.
pub async fn get_app<'e, E: SqliteExecutor<'e>>(executor: E, id: i64) -> Result<App> {
    sqlx::query_as::<_, App>(&format!("SELECT {APP_COLUMNS} FROM apps WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "App",
            id: id.to_string(),
        })
}

/// Find an app by its public key, including disabled ones.
pub async fn find_app_by_pubkey<'e, E: SqliteExecutor<'e>>(
    executor: E,
    pubkey: &str,
) -> Result<Option<App>> {
    let app = sqlx::query_as::<_, App>(&format!(
        "SELECT {APP_COLUMNS} FROM apps WHERE pubkey = ?"
    ))
    .bind(pubkey)
    .fetch_optional(executor)
    .await?;

    Ok(app)
}

/// List all apps, newest first.
pub async fn list_apps(pool: &SqlitePool) -> Result<Vec<App>> {
    let apps = sqlx::query_as::<_, App>(&format!(
        "SELECT {APP_COLUMNS} FROM apps ORDER BY id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(apps)
}

/// Switch an app between isolated and shared balance accounting.
pub async fn set_isolated(pool: &SqlitePool, id: i64, isolated: bool) -> Result<()> {
    let result = sqlx::query("UPDATE apps SET isolated = ? WHERE id = ?")
        .bind(isolated)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "App",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Soft-delete an app. Its transactions and request events are kept.
pub async fn disable_app(pool: &SqlitePool, pubkey: &str) -> Result<()> {
    let result = sqlx::query("UPDATE apps SET disabled = 1 WHERE pubkey = ?")
        .bind(pubkey)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "App",
            id: pubkey.to_string(),
        });
    }

    tracing::info!(pubkey = %pubkey, "Disabled app");
    Ok(())
}
