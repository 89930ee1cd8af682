//! Error types for the wallet service.

use database::DatabaseError;
use nip47::{ErrorCode, Method};
use node_core::BackendError;
use thiserror::Error;

use crate::permissions::Deny;
use crate::publisher::ReplyTarget;

/// Errors a command handler can end with. Every variant maps to a protocol
/// error code sent back to the app.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The permission and budget engine refused the request.
    #[error("{0}")]
    Denied(Deny),

    /// Missing or invalid request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The referenced invoice or payment is unknown to this app.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Ledger read or write failed.
    #[error("storage error: {0}")]
    Database(#[from] DatabaseError),

    /// Anything else that is our fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Deny> for ServiceError {
    fn from(deny: Deny) -> Self {
        ServiceError::Denied(deny)
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(DatabaseError::Sqlx(err))
    }
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Denied(deny) => deny.code(),
            ServiceError::BadRequest(_) => ErrorCode::BadRequest,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::Backend(err) => backend_code(err),
            ServiceError::Database(_) | ServiceError::Internal(_) => ErrorCode::Internal,
        }
    }
}

fn backend_code(err: &BackendError) -> ErrorCode {
    match err {
        BackendError::PaymentFailed(_) | BackendError::AlreadyPaid => ErrorCode::PaymentFailed,
        BackendError::Unavailable(_) | BackendError::Backend(_) => ErrorCode::Internal,
        BackendError::Timeout => ErrorCode::Other,
        BackendError::NotSupported(_) => ErrorCode::NotImplemented,
        BackendError::InvalidAmount(_) | BackendError::InvalidInvoice(_) => ErrorCode::BadRequest,
        BackendError::NotFound(_) => ErrorCode::NotFound,
        BackendError::InsufficientBalance => ErrorCode::InsufficientBalance,
    }
}

/// Why an inbound event did not become a dispatchable request.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No enabled app is registered for the sender key.
    #[error("unknown app: {0}")]
    UnknownApp(String),

    /// The payload could not be decrypted with the sender's key.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The event id was already recorded; relay re-delivery.
    #[error("duplicate request event: {0}")]
    Duplicate(String),

    /// The payload is not a `{"method", "params"}` envelope.
    #[error("malformed request: {reason}")]
    MalformedRequest { target: ReplyTarget, reason: String },

    /// The method has no handler.
    #[error("unsupported method: {method}")]
    UnsupportedMethod { target: ReplyTarget, method: String },

    /// The ledger could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl DecodeError {
    /// Error response for failures that can be attributed to a known app.
    /// The rest are logged only.
    pub fn reply(&self) -> Option<(&ReplyTarget, nip47::Response)> {
        match self {
            DecodeError::MalformedRequest { target, reason } => Some((
                target,
                nip47::Response::error("", ErrorCode::BadRequest, reason.clone()),
            )),
            DecodeError::UnsupportedMethod { target, method } => Some((
                target,
                nip47::Response::error(
                    method.clone(),
                    ErrorCode::NotImplemented,
                    format!("unknown method: {method}"),
                ),
            )),
            _ => None,
        }
    }
}

/// Error response for a failed handler.
pub fn error_response(method: Method, err: &ServiceError) -> nip47::Response {
    nip47::Response::error(method.as_str(), err.code(), err.to_string())
}
