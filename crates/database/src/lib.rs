//! SQLite ledger for the wallet-connect gateway.
//!
//! Stores registered apps with their permission grants, the payment and
//! invoice ledger, inbound request records and the outbox of encrypted
//! responses, using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{app::{self, NewApp}, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite:data/nwc.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let new_app = NewApp {
//!         name: "Alby".to_string(),
//!         pubkey: "c27fb3650c844cf28555814bb065e448c27fb3650c844cf28555814bb065e448".to_string(),
//!         isolated: false,
//!         expires_at: None,
//!         scopes: vec!["get_balance".to_string()],
//!         budget: None,
//!     };
//!     app::create_app(db.pool(), &new_app, database::unix_timestamp()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod error;
pub mod models;
pub mod permission;
pub mod request_event;
pub mod response_event;
pub mod transaction;

pub use error::{DatabaseError, Result};
pub use models::{
    App, BudgetRenewal, Direction, PermissionGrant, RequestEvent, ResponseEvent, ResponseState,
    Transaction, TransactionState,
};
pub use transaction::{NewTransaction, StateFilter, TransactionFilter};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size. Request tasks run concurrently and each holds a
    /// connection only for the duration of one statement or transaction.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:data/nwc.db?mode=rwc").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url = %url, pool_size, "Connected to database");

        Ok(Self { pool })
    }

    /// Open a migrated in-memory database.
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to one connection that is never recycled.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
