//! Turns relay events into authenticated, recorded requests.

use database::{app, request_event, unix_timestamp, App, DatabaseError};
use nip47::{Encryption, InboundEvent, Method, Request};
use tracing::debug;

use crate::context::ServiceContext;
use crate::error::DecodeError;
use crate::publisher::ReplyTarget;

/// A request ready for dispatch.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    pub target: ReplyTarget,
    pub app: App,
    pub method: Method,
    pub request: Request,
}

impl DecodedRequest {
    pub fn request_event_id(&self) -> i64 {
        self.target.request_event_id
    }
}

/// Resolve the sending app, decrypt, record and parse an inbound event.
///
/// The request event row is written as soon as the payload decrypts, so
/// malformed requests from known apps still get a correlated error reply
/// and relay re-deliveries are recognised as duplicates.
pub async fn decode(
    ctx: &ServiceContext,
    event: &InboundEvent,
) -> Result<DecodedRequest, DecodeError> {
    let app = app::find_app_by_pubkey(ctx.pool(), &event.pubkey)
        .await?
        .filter(|app| !app.disabled)
        .ok_or_else(|| DecodeError::UnknownApp(event.pubkey.clone()))?;

    let encryption = Encryption::from_tags(&event.tags);
    let payload = ctx
        .cipher
        .decrypt(&event.pubkey, &event.content, encryption)
        .map_err(|e| DecodeError::DecryptionFailed(e.to_string()))?;

    let parsed = Request::parse(&payload);
    let method_name = parsed.as_ref().ok().map(|request| request.method.as_str());

    let recorded = request_event::create_request_event(
        ctx.pool(),
        &event.id,
        Some(app.id),
        method_name,
        unix_timestamp(),
    )
    .await;
    let request_event = match recorded {
        Ok(row) => row,
        Err(DatabaseError::AlreadyExists { .. }) => {
            return Err(DecodeError::Duplicate(event.id.clone()))
        }
        Err(err) => return Err(err.into()),
    };

    let target = ReplyTarget {
        app_id: app.id,
        app_pubkey: app.pubkey.clone(),
        request_event_id: request_event.id,
        request_nostr_id: event.id.clone(),
        encryption,
    };

    let request = match parsed {
        Ok(request) => request,
        Err(err) => {
            return Err(DecodeError::MalformedRequest {
                target,
                reason: err.to_string(),
            })
        }
    };

    let Some(method) = Method::from_name(&request.method) else {
        return Err(DecodeError::UnsupportedMethod {
            target,
            method: request.method,
        });
    };

    debug!(
        event_id = %event.id,
        app_id = app.id,
        method = %method,
        encryption = encryption.as_str(),
        "Decoded request"
    );

    Ok(DecodedRequest {
        target,
        app,
        method,
        request,
    })
}
