//! Outbox of encrypted responses.
//!
//! A response is stored before it is handed to the relays and stays
//! `pending` until a relay accepts it, so a crash or relay outage never
//! loses a reply.

use sqlx::SqliteExecutor;

use crate::error::{DatabaseError, Result};
use crate::models::ResponseEvent;

const RESPONSE_COLUMNS: &str = "id, request_event_id, request_nostr_id, app_pubkey, content, \
     encryption, state, attempts, nostr_id, created_at, published_at";

/// Fields needed to queue a response.
#[derive(Debug, Clone)]
pub struct NewResponseEvent {
    pub request_event_id: i64,
    pub request_nostr_id: String,
    pub app_pubkey: String,
    pub content: String,
    pub encryption: String,
}

/// Queue an encrypted response for delivery.
pub async fn insert_response_event<'e, E: SqliteExecutor<'e>>(
    executor: E,
    new: &NewResponseEvent,
    now: i64,
) -> Result<ResponseEvent> {
    let event = sqlx::query_as::<_, ResponseEvent>(&format!(
        r#"
        INSERT INTO response_events (request_event_id, request_nostr_id, app_pubkey, content, encryption, state, attempts, created_at)
        VALUES (?, ?, ?, ?, ?, 'pending', 0, ?)
        RETURNING {RESPONSE_COLUMNS}
        "#
    ))
    .bind(new.request_event_id)
    .bind(&new.request_nostr_id)
    .bind(&new.app_pubkey)
    .bind(&new.content)
    .bind(&new.encryption)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(event)
}

/// Mark a response as accepted by the relays.
pub async fn mark_published<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: i64,
    nostr_id: &str,
    now: i64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE response_events
        SET state = 'published', nostr_id = ?, published_at = ?, attempts = attempts + 1
        WHERE id = ?
        "#,
    )
    .bind(nostr_id)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "ResponseEvent",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Count a failed delivery attempt.
pub async fn record_attempt<'e, E: SqliteExecutor<'e>>(executor: E, id: i64) -> Result<()> {
    sqlx::query("UPDATE response_events SET attempts = attempts + 1 WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Responses still waiting for a relay, oldest first.
pub async fn list_pending_responses<'e, E: SqliteExecutor<'e>>(
    executor: E,
    limit: i64,
) -> Result<Vec<ResponseEvent>> {
    let events = sqlx::query_as::<_, ResponseEvent>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM response_events WHERE state = 'pending' ORDER BY id ASC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseState;
    use crate::request_event::create_request_event;
    use crate::Database;

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let db = Database::connect_in_memory().await.unwrap();
        let request = create_request_event(db.pool(), "req", None, Some("get_balance"), 1)
            .await
            .unwrap();

        let new = NewResponseEvent {
            request_event_id: request.id,
            request_nostr_id: "req".to_string(),
            app_pubkey: "ab".repeat(32),
            content: "ciphertext".to_string(),
            encryption: "nip04".to_string(),
        };
        let queued = insert_response_event(db.pool(), &new, 2).await.unwrap();
        assert_eq!(queued.state, ResponseState::Pending);

        record_attempt(db.pool(), queued.id).await.unwrap();
        let pending = list_pending_responses(db.pool(), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        mark_published(db.pool(), queued.id, "resp", 3).await.unwrap();
        assert!(list_pending_responses(db.pool(), 10).await.unwrap().is_empty());

        let missing = mark_published(db.pool(), 999, "x", 3).await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }
}
