//! Request-processing engine for the wallet-connect gateway.
//!
//! ```text
//!   relay listener ──InboundEvent──▶ Dispatcher ──▶ decoder ──▶ handlers
//!                                        │                        │
//!                                        │                 permissions, ledger,
//!                                        │                    node backend
//!                                        ▼
//!                                   PublishHandle ──Outgoing──▶ Publisher ──▶ RelaySink
//!                                                                  │
//!                                                               outbox
//!
//!   reconcile::run  ── periodic sweep of pending ledger rows
//! ```
//!
//! The engine never talks to relays directly. It consumes [`nip47::InboundEvent`]s
//! from a channel and hands encrypted responses to a [`nip47::RelaySink`], so
//! tests drive it end to end with a recording sink and a mock node.

pub mod config;
pub mod context;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod permissions;
pub mod publisher;
pub mod reconcile;

pub use config::{ConfigError, ServiceConfig};
pub use context::ServiceContext;
pub use decoder::DecodedRequest;
pub use dispatcher::{dispatch, process_event, Dispatcher, ProcessOutcome};
pub use error::{DecodeError, ServiceError};
pub use permissions::{Authorization, Deny};
pub use publisher::{Outgoing, PublishHandle, Publisher, ReplyTarget};
pub use reconcile::SweepSummary;

use std::sync::Arc;

use nip47::{InboundEvent, RelaySink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Handles to the engine's background tasks.
pub struct WalletService {
    pub dispatcher: JoinHandle<()>,
    pub publisher: JoinHandle<()>,
    pub reconciler: JoinHandle<()>,
}

impl WalletService {
    /// Spawn the dispatcher, publisher and reconciler.
    ///
    /// The dispatcher stops when `inbound` closes; the publisher drains
    /// remaining responses and stops once every in-flight request is done.
    pub fn start(
        ctx: Arc<ServiceContext>,
        sink: Arc<dyn RelaySink>,
        inbound: mpsc::Receiver<InboundEvent>,
    ) -> Self {
        let (publish, outgoing) = publisher::channel(ctx.config.outbound_queue.max(1));
        let publisher = Publisher::new(
            ctx.db.clone(),
            ctx.cipher.clone(),
            sink,
            ctx.config.publish_retry_interval,
        );

        info!(backend = ctx.backend.name(), "Starting wallet service");
        let publisher = tokio::spawn(publisher.run(outgoing));
        let dispatcher = tokio::spawn(Dispatcher::new(ctx.clone(), publish).run(inbound));
        let reconciler = tokio::spawn(reconcile::run(ctx));

        Self {
            dispatcher,
            publisher,
            reconciler,
        }
    }

    /// Stop the periodic sweep and wait for the request path to drain.
    pub async fn join(self) {
        let _ = self.dispatcher.await;
        self.reconciler.abort();
        let _ = self.publisher.await;
    }
}
