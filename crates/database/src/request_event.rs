//! Inbound request records.

use sqlx::SqliteExecutor;

use crate::error::{DatabaseError, Result};
use crate::models::RequestEvent;

/// Record an inbound request.
///
/// Fails with [`DatabaseError::AlreadyExists`] if the nostr event id was
/// already seen, which is how relay re-deliveries are detected.
pub async fn create_request_event<'e, E: SqliteExecutor<'e>>(
    executor: E,
    nostr_id: &str,
    app_id: Option<i64>,
    method: Option<&str>,
    now: i64,
) -> Result<RequestEvent> {
    sqlx::query_as::<_, RequestEvent>(
        r#"
        INSERT INTO request_events (nostr_id, app_id, method, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, nostr_id, app_id, method, created_at
        "#,
    )
    .bind(nostr_id)
    .bind(app_id)
    .bind(method)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(|e| DatabaseError::from_insert(e, "RequestEvent", nostr_id))
}

/// Look up a request by its nostr event id.
pub async fn find_by_nostr_id<'e, E: SqliteExecutor<'e>>(
    executor: E,
    nostr_id: &str,
) -> Result<Option<RequestEvent>> {
    let event = sqlx::query_as::<_, RequestEvent>(
        "SELECT id, nostr_id, app_id, method, created_at FROM request_events WHERE nostr_id = ?",
    )
    .bind(nostr_id)
    .fetch_optional(executor)
    .await?;

    Ok(event)
}

/// Receive time of the newest recorded request, used to resume a relay
/// subscription after restart.
pub async fn latest_created_at<'e, E: SqliteExecutor<'e>>(executor: E) -> Result<Option<i64>> {
    let latest = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(created_at) FROM request_events")
        .fetch_one(executor)
        .await?;

    Ok(latest)
}
