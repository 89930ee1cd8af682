//! Error types for node backend operations.

use thiserror::Error;

/// Errors a node backend can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The node could not be reached or answered with a transport error.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The requested amount is zero, negative or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The payment request could not be parsed.
    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),

    /// The payment was attempted and did not go through.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// The payment hash already has a settled payment.
    #[error("invoice already paid")]
    AlreadyPaid,

    /// The node does not hold enough funds.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// No answer within the caller's deadline. The operation may still
    /// complete.
    #[error("backend call timed out")]
    Timeout,

    /// The node does not know the requested payment.
    #[error("not found: {0}")]
    NotFound(String),

    /// This backend has no such capability.
    #[error("{0} is not supported by this backend")]
    NotSupported(&'static str),

    /// The node answered with something unexpected.
    #[error("backend error: {0}")]
    Backend(String),
}
