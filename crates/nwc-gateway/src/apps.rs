//! App management commands.

use database::app::{self, NewApp};
use database::{unix_timestamp, BudgetRenewal, Database};
use nip47::{connection_uri, Keys, Method, RelayConfig};
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub name: String,
    pub scopes: Vec<String>,
    pub isolated: bool,
    pub budget_msat: Option<i64>,
    pub renewal: String,
    pub expires_at: Option<i64>,
}

async fn open_database() -> Result<Database> {
    let db = Database::connect(&GatewayConfig::database_url_from_env()?).await?;
    db.migrate().await?;
    Ok(db)
}

/// Validate requested scopes. Empty means every method.
fn resolve_scopes(requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(Method::ALL.iter().map(|m| m.as_str().to_string()).collect());
    }

    let mut scopes = Vec::with_capacity(requested.len());
    for scope in requested.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let method = Method::from_name(scope)
            .ok_or_else(|| GatewayError::Config(format!("unknown method: {scope}")))?;
        let name = method.as_str().to_string();
        if !scopes.contains(&name) {
            scopes.push(name);
        }
    }
    Ok(scopes)
}

fn resolve_budget(options: &AddOptions) -> Result<Option<(i64, BudgetRenewal)>> {
    let Some(max) = options.budget_msat else {
        return Ok(None);
    };
    if max <= 0 {
        return Err(GatewayError::Config("budget must be positive".to_string()));
    }
    let renewal = options.renewal.parse::<BudgetRenewal>()?;
    Ok(Some((max, renewal)))
}

pub async fn add(options: AddOptions) -> Result<()> {
    let relay = RelayConfig::from_env()?;
    let wallet = relay.keys()?;
    let db = open_database().await?;

    let scopes = resolve_scopes(&options.scopes)?;
    let budget = resolve_budget(&options)?;
    let app_keys = Keys::generate();

    let created = app::create_app(
        db.pool(),
        &NewApp {
            name: options.name,
            pubkey: app_keys.public_key().to_hex(),
            isolated: options.isolated,
            expires_at: options.expires_at,
            scopes: scopes.clone(),
            budget,
        },
        unix_timestamp(),
    )
    .await?;

    info!(app_id = created.id, scopes = %scopes.join(" "), "App created");
    println!(
        "{}",
        connection_uri(&wallet.public_key(), &relay.relays, app_keys.secret_key())
    );
    Ok(())
}

pub async fn list() -> Result<()> {
    let db = open_database().await?;
    for app in app::list_apps(db.pool()).await? {
        let grants = database::permission::list_grants(db.pool(), app.id).await?;
        let scopes: Vec<&str> = grants.iter().map(|g| g.scope.as_str()).collect();
        println!(
            "{}\t{}\t{}\t{}{}\t{}",
            app.id,
            app.pubkey,
            app.name,
            if app.isolated { "isolated" } else { "shared" },
            if app.disabled { ",disabled" } else { "" },
            scopes.join(",")
        );
    }
    Ok(())
}

pub async fn disable(pubkey: &str) -> Result<()> {
    let db = open_database().await?;
    app::disable_app(db.pool(), pubkey).await?;
    info!(pubkey = %pubkey, "App disabled");
    Ok(())
}
