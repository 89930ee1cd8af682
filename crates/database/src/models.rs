//! Database models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::DatabaseError;

const DAY_SECS: i64 = 24 * 60 * 60;

/// A client application allowed to talk to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct App {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Human readable name chosen at connection time.
    pub name: String,
    /// Hex encoded public key the app signs its requests with.
    pub pubkey: String,
    /// Whether the app only sees its own sub-ledger.
    pub isolated: bool,
    /// Soft-delete flag.
    pub disabled: bool,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
    /// Optional expiry (unix seconds).
    pub expires_at: Option<i64>,
}

impl App {
    /// Whether the app's connection has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// How often an amount-bounded grant resets its usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetRenewal {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl BudgetRenewal {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetRenewal::Daily => "daily",
            BudgetRenewal::Weekly => "weekly",
            BudgetRenewal::Monthly => "monthly",
            BudgetRenewal::Yearly => "yearly",
            BudgetRenewal::Never => "never",
        }
    }

    /// Length of one budget period in seconds, `None` for [`BudgetRenewal::Never`].
    ///
    /// Months and years are fixed 30 and 365 day windows.
    pub fn period_secs(&self) -> Option<i64> {
        match self {
            BudgetRenewal::Daily => Some(DAY_SECS),
            BudgetRenewal::Weekly => Some(7 * DAY_SECS),
            BudgetRenewal::Monthly => Some(30 * DAY_SECS),
            BudgetRenewal::Yearly => Some(365 * DAY_SECS),
            BudgetRenewal::Never => None,
        }
    }

    /// Start of the period containing `now`, or `None` if `period_start` is
    /// still current.
    ///
    /// The start only ever advances by whole periods so renewals stay aligned
    /// to the moment the grant was created.
    pub fn rolled_period_start(&self, period_start: i64, now: i64) -> Option<i64> {
        let period = self.period_secs()?;
        if now < period_start + period {
            return None;
        }
        let elapsed_periods = (now - period_start) / period;
        Some(period_start + elapsed_periods * period)
    }
}

impl fmt::Display for BudgetRenewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetRenewal {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "daily" => Ok(BudgetRenewal::Daily),
            "weekly" => Ok(BudgetRenewal::Weekly),
            "monthly" => Ok(BudgetRenewal::Monthly),
            "yearly" => Ok(BudgetRenewal::Yearly),
            "never" => Ok(BudgetRenewal::Never),
            other => Err(DatabaseError::UnknownVariant {
                kind: "budget_renewal",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for BudgetRenewal {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A scope granted to an app, optionally bounded by a renewable budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionGrant {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Owning app.
    pub app_id: i64,
    /// Method name this grant allows (e.g. "pay_invoice").
    pub scope: String,
    /// Spending cap per period; `None` means unbounded.
    pub max_amount_msat: Option<i64>,
    /// Renewal period of the cap.
    #[sqlx(try_from = "String")]
    pub budget_renewal: BudgetRenewal,
    /// Settled spend counted against the cap in the current period.
    pub usage_msat: i64,
    /// Start of the current budget period (unix seconds).
    pub period_start: i64,
}

/// Direction of a payment relative to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            other => Err(DatabaseError::UnknownVariant {
                kind: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Settled,
    Failed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Settled => "settled",
            TransactionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Pending)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionState::Pending),
            "settled" => Ok(TransactionState::Settled),
            "failed" => Ok(TransactionState::Failed),
            other => Err(DatabaseError::UnknownVariant {
                kind: "transaction state",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for TransactionState {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One payment or invoice lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Owning app; `None` for activity not attributed to any app.
    pub app_id: Option<i64>,
    /// Request that created this row, if any.
    pub request_event_id: Option<i64>,
    #[sqlx(rename = "type", try_from = "String")]
    pub direction: Direction,
    #[sqlx(try_from = "String")]
    pub state: TransactionState,
    pub amount_msat: i64,
    pub fee_msat: i64,
    /// Fee held back while an outgoing payment is in flight.
    pub fee_reserve_msat: i64,
    pub payment_hash: String,
    pub preimage: Option<String>,
    /// Bolt11 invoice string.
    pub payment_request: String,
    pub description: String,
    pub description_hash: String,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub settled_at: Option<i64>,
    pub expires_at: Option<i64>,
}

/// A recorded inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RequestEvent {
    /// Auto-incrementing ID, used as the correlation id inside the gateway.
    pub id: i64,
    /// Nostr event id of the request.
    pub nostr_id: String,
    pub app_id: Option<i64>,
    pub method: Option<String>,
    pub created_at: i64,
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseState {
    Pending,
    Published,
}

impl ResponseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseState::Pending => "pending",
            ResponseState::Published => "published",
        }
    }
}

impl TryFrom<String> for ResponseState {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(ResponseState::Pending),
            "published" => Ok(ResponseState::Published),
            _ => Err(DatabaseError::UnknownVariant {
                kind: "response state",
                value,
            }),
        }
    }
}

/// An encrypted response waiting for (or done with) relay delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ResponseEvent {
    pub id: i64,
    pub request_event_id: i64,
    /// Nostr id of the request this answers (`e` tag).
    pub request_nostr_id: String,
    /// Recipient (`p` tag).
    pub app_pubkey: String,
    /// Encrypted payload.
    pub content: String,
    /// Encryption scheme name ("nip04" or "nip44_v2").
    pub encryption: String,
    #[sqlx(try_from = "String")]
    pub state: ResponseState,
    pub attempts: i64,
    pub nostr_id: Option<String>,
    pub created_at: i64,
    pub published_at: Option<i64>,
}
