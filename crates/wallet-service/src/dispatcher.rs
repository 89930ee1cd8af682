//! Routes decoded requests to their handlers.

use std::future::Future;
use std::sync::Arc;

use nip47::{ErrorCode, InboundEvent, Method, Response};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::context::ServiceContext;
use crate::decoder::{self, DecodedRequest};
use crate::error::{error_response, DecodeError, ServiceError};
use crate::handlers;
use crate::publisher::{Outgoing, PublishHandle};

/// What happened to one inbound event.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// A response was produced and should be published.
    Replied(Outgoing),
    /// Nothing is sent back.
    Skipped { reason: String },
}

/// Run the handler for `request.method` and wrap its result.
pub async fn dispatch(ctx: &ServiceContext, request: &DecodedRequest) -> Response {
    let result: Result<Value, ServiceError> = match request.method {
        Method::GetInfo => handlers::get_info::handle(ctx, request).await,
        Method::GetBalance => handlers::get_balance::handle(ctx, request).await,
        Method::PayInvoice => handlers::pay_invoice::handle(ctx, request).await,
        Method::MakeInvoice => handlers::make_invoice::handle(ctx, request).await,
        Method::LookupInvoice => handlers::lookup_invoice::handle(ctx, request).await,
        Method::ListTransactions => handlers::list_transactions::handle(ctx, request).await,
        Method::ListChannels => handlers::list_channels::handle(ctx, request).await,
        Method::ConnectPeer => handlers::connect_peer::handle(ctx, request).await,
    };

    match result {
        Ok(value) => Response::success(request.method.as_str(), value),
        Err(err) => {
            let response = error_response(request.method, &err);
            match &err {
                ServiceError::Denied(_) | ServiceError::BadRequest(_) | ServiceError::NotFound(_) => {
                    info!(
                        app_id = request.app.id,
                        method = %request.method,
                        code = response.error_code().map(|code| code.as_str()).unwrap_or_default(),
                        error = %err,
                        "Request rejected"
                    );
                }
                _ => {
                    warn!(
                        app_id = request.app.id,
                        method = %request.method,
                        error = %err,
                        "Request failed"
                    );
                }
            }
            response
        }
    }
}

/// Decode one event and, if it is answerable, produce its response.
///
/// The handler runs on its own task so a panic inside it still yields an
/// `INTERNAL` error response instead of a silent drop.
pub async fn process_event(ctx: Arc<ServiceContext>, event: InboundEvent) -> ProcessOutcome {
    let decoded = match decoder::decode(&ctx, &event).await {
        Ok(decoded) => decoded,
        Err(err) => return decode_failure(&event, err),
    };

    let target = decoded.target.clone();
    let method = decoded.method;
    let handler_ctx = ctx.clone();
    let handled = tokio::spawn(async move { dispatch(&handler_ctx, &decoded).await }).await;

    let response = match handled {
        Ok(response) => response,
        Err(err) => {
            error!(event_id = %event.id, method = %method, error = %err, "Handler crashed");
            Response::error(method.as_str(), ErrorCode::Internal, "internal error")
        }
    };

    ProcessOutcome::Replied(Outgoing { target, response })
}

fn decode_failure(event: &InboundEvent, err: DecodeError) -> ProcessOutcome {
    if let Some((target, response)) = err.reply() {
        info!(event_id = %event.id, error = %err, "Rejected request");
        return ProcessOutcome::Replied(Outgoing {
            target: target.clone(),
            response,
        });
    }

    match &err {
        DecodeError::Duplicate(_) => debug!(event_id = %event.id, "Skipping duplicate request"),
        DecodeError::Storage(_) => error!(event_id = %event.id, error = %err, "Failed to record request"),
        _ => warn!(event_id = %event.id, pubkey = %event.pubkey, error = %err, "Ignoring request"),
    }
    ProcessOutcome::Skipped {
        reason: err.to_string(),
    }
}

/// Consumes inbound events, processing each on its own task.
///
/// Concurrency is capped by `max_concurrent_requests`; per-app ordering is
/// not guaranteed.
pub struct Dispatcher {
    ctx: Arc<ServiceContext>,
    publish: PublishHandle,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ServiceContext>, publish: PublishHandle) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.max_concurrent_requests.max(1)));
        Self {
            ctx,
            publish,
            permits,
        }
    }

    /// Process events until the inbound channel closes.
    pub async fn run(self, rx: mpsc::Receiver<InboundEvent>) {
        self.run_with_shutdown(rx, std::future::pending()).await
    }

    /// Process events until the inbound channel closes or `shutdown` completes.
    /// In-flight requests keep running to completion either way.
    pub async fn run_with_shutdown<S>(self, mut rx: mpsc::Receiver<InboundEvent>, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        info!(
            max_concurrent = self.ctx.config.max_concurrent_requests,
            "Starting request dispatcher"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }

                event = rx.recv() => {
                    let Some(event) = event else {
                        warn!("Request stream ended");
                        break;
                    };
                    let Ok(permit) = self.permits.clone().acquire_owned().await else {
                        break;
                    };
                    let ctx = self.ctx.clone();
                    let publish = self.publish.clone();
                    tokio::spawn(async move {
                        if let ProcessOutcome::Replied(outgoing) = process_event(ctx, event).await {
                            publish.publish(outgoing).await;
                        }
                        drop(permit);
                    });
                }
            }
        }
    }
}
