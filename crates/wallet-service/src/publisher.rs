//! Response publication.
//!
//! Handlers hand finished responses to a bounded channel. The publisher task
//! encrypts each one, stores it in the outbox, then sends it to the relays.
//! Rows the relays did not accept stay `pending` and are resent on a timer,
//! so every response is delivered at least once even across restarts.
//! Responses the outbox could not store are held in memory and queued again
//! on the next retry tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use database::response_event::{self, NewResponseEvent};
use database::{unix_timestamp, Database, ResponseEvent};
use nip47::{Cipher, Encryption, OutboundResponse, RelaySink, Response};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;

/// Outbox rows resent per retry pass.
const RETRY_BATCH: i64 = 100;

/// Responses held in memory while the outbox is failing.
const MAX_BACKLOG: usize = 1_000;

/// Who a response goes to and which request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub app_id: i64,
    pub app_pubkey: String,
    pub request_event_id: i64,
    pub request_nostr_id: String,
    pub encryption: Encryption,
}

#[derive(Debug, Clone)]
pub struct Outgoing {
    pub target: ReplyTarget,
    pub response: Response,
}

/// Sending side of the response channel.
#[derive(Clone)]
pub struct PublishHandle {
    tx: mpsc::Sender<Outgoing>,
}

impl PublishHandle {
    pub async fn publish(&self, outgoing: Outgoing) {
        let request_id = outgoing.target.request_nostr_id.clone();
        if self.tx.send(outgoing).await.is_err() {
            error!(request_id = %request_id, "Publisher stopped, response dropped");
        }
    }
}

pub fn channel(capacity: usize) -> (PublishHandle, mpsc::Receiver<Outgoing>) {
    let (tx, rx) = mpsc::channel(capacity);
    (PublishHandle { tx }, rx)
}

pub struct Publisher {
    db: Database,
    cipher: Cipher,
    sink: Arc<dyn RelaySink>,
    retry_interval: Duration,
    backlog: Mutex<VecDeque<Outgoing>>,
}

impl Publisher {
    pub fn new(
        db: Database,
        cipher: Cipher,
        sink: Arc<dyn RelaySink>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            db,
            cipher,
            sink,
            retry_interval,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    /// Deliver responses until every [`PublishHandle`] is dropped. Leftover
    /// outbox rows from a previous run go out on the first retry tick.
    pub async fn run(self, mut rx: mpsc::Receiver<Outgoing>) {
        let mut retry = tokio::time::interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(outgoing) => {
                        self.submit(outgoing).await;
                    }
                    None => break,
                },
                _ = retry.tick() => {
                    self.retry_pending().await;
                }
            }
        }

        info!("Publisher stopped");
    }

    /// Deliver one response, holding it for the next retry tick if the
    /// outbox cannot store it.
    pub async fn submit(&self, outgoing: Outgoing) {
        match self.queue(&outgoing).await {
            Ok(row) => {
                self.send(&row).await;
            }
            Err(err) => self.hold(outgoing, err).await,
        }
    }

    /// Responses waiting to be stored in the outbox.
    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    async fn hold(&self, outgoing: Outgoing, err: ServiceError) {
        let request_id = outgoing.target.request_nostr_id.clone();
        if !matches!(err, ServiceError::Database(_)) {
            error!(request_id = %request_id, error = %err, "Failed to queue response, dropped");
            return;
        }

        let mut backlog = self.backlog.lock().await;
        if backlog.len() >= MAX_BACKLOG {
            if let Some(dropped) = backlog.pop_front() {
                error!(
                    request_id = %dropped.target.request_nostr_id,
                    "Response backlog full, oldest response dropped"
                );
            }
        }
        warn!(request_id = %request_id, error = %err, "Failed to store response, will retry");
        backlog.push_back(outgoing);
    }

    /// Store held responses in the outbox. Ones that still fail stay held.
    async fn requeue_backlog(&self) {
        let held = std::mem::take(&mut *self.backlog.lock().await);
        if held.is_empty() {
            return;
        }

        let total = held.len();
        let mut stored = 0;
        for outgoing in held {
            match self.queue(&outgoing).await {
                Ok(_) => stored += 1,
                Err(err) => self.hold(outgoing, err).await,
            }
        }
        info!(held = total, stored, "Requeued held responses");
    }

    /// Encrypt, store and send one response. Returns whether a relay accepted it.
    pub async fn deliver(&self, outgoing: Outgoing) -> Result<bool, ServiceError> {
        let row = self.queue(&outgoing).await?;
        Ok(self.send(&row).await)
    }

    async fn queue(&self, outgoing: &Outgoing) -> Result<ResponseEvent, ServiceError> {
        let target = &outgoing.target;
        let json = outgoing
            .response
            .to_json()
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let content = self
            .cipher
            .encrypt(&target.app_pubkey, &json, target.encryption)
            .map_err(|e| ServiceError::Internal(format!("failed to encrypt response: {e}")))?;

        let row = response_event::insert_response_event(
            self.db.pool(),
            &NewResponseEvent {
                request_event_id: target.request_event_id,
                request_nostr_id: target.request_nostr_id.clone(),
                app_pubkey: target.app_pubkey.clone(),
                content,
                encryption: target.encryption.as_str().to_string(),
            },
            unix_timestamp(),
        )
        .await?;

        debug!(
            response_id = row.id,
            request_id = %target.request_nostr_id,
            result_type = %outgoing.response.result_type,
            "Queued response"
        );
        Ok(row)
    }

    async fn send(&self, row: &ResponseEvent) -> bool {
        let encryption = match Encryption::parse(&row.encryption) {
            Ok(encryption) => encryption,
            Err(err) => {
                error!(response_id = row.id, error = %err, "Outbox row has unknown encryption");
                return false;
            }
        };

        let outbound = OutboundResponse {
            app_pubkey: row.app_pubkey.clone(),
            request_id: row.request_nostr_id.clone(),
            content: row.content.clone(),
            encryption,
        };

        match self.sink.publish_response(&outbound).await {
            Ok(result) => {
                if let Err(err) = response_event::mark_published(
                    self.db.pool(),
                    row.id,
                    &result.event_id,
                    unix_timestamp(),
                )
                .await
                {
                    error!(response_id = row.id, error = %err, "Failed to mark response published");
                }
                info!(
                    response_id = row.id,
                    event_id = %result.event_id,
                    request_id = %row.request_nostr_id,
                    "Published response"
                );
                true
            }
            Err(err) => {
                warn!(
                    response_id = row.id,
                    attempts = row.attempts + 1,
                    error = %err,
                    "Failed to publish response, will retry"
                );
                if let Err(err) = response_event::record_attempt(self.db.pool(), row.id).await {
                    error!(response_id = row.id, error = %err, "Failed to record publish attempt");
                }
                false
            }
        }
    }

    /// Store held responses, then resend outbox rows no relay has accepted
    /// yet. Returns how many went out.
    pub async fn retry_pending(&self) -> usize {
        self.requeue_backlog().await;

        let rows = match response_event::list_pending_responses(self.db.pool(), RETRY_BATCH).await
        {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "Failed to load pending responses");
                return 0;
            }
        };

        let mut published = 0;
        for row in &rows {
            if self.send(row).await {
                published += 1;
            }
        }
        if !rows.is_empty() {
            info!(pending = rows.len(), published, "Retried pending responses");
        }
        published
    }
}
