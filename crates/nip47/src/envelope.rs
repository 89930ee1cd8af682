//! JSON request and response envelopes.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Wallet commands the service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetBalance,
    GetInfo,
    MakeInvoice,
    LookupInvoice,
    ListTransactions,
    PayInvoice,
    ListChannels,
    ConnectPeer,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::GetBalance,
        Method::GetInfo,
        Method::MakeInvoice,
        Method::LookupInvoice,
        Method::ListTransactions,
        Method::PayInvoice,
        Method::ListChannels,
        Method::ConnectPeer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GetBalance => "get_balance",
            Method::GetInfo => "get_info",
            Method::MakeInvoice => "make_invoice",
            Method::LookupInvoice => "lookup_invoice",
            Method::ListTransactions => "list_transactions",
            Method::PayInvoice => "pay_invoice",
            Method::ListChannels => "list_channels",
            Method::ConnectPeer => "connect_peer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == name)
    }

    /// Methods that move funds out of the wallet.
    pub fn is_spend(&self) -> bool {
        matches!(self, Method::PayInvoice)
    }

    /// Space separated method list for the info event.
    pub fn info_content() -> String {
        Self::ALL
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted request payload: `{"method": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Parse a decrypted payload. Missing or null params become `{}`.
    pub fn parse(json: &str) -> Result<Self, Error> {
        let mut request: Request =
            serde_json::from_str(json).map_err(|e| Error::MalformedRequest(e.to_string()))?;

        match request.params {
            Value::Null => request.params = Value::Object(Map::new()),
            Value::Object(_) => {}
            _ => {
                return Err(Error::MalformedRequest(
                    "params must be an object".to_string(),
                ))
            }
        }

        Ok(request)
    }

    pub fn params<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    NotImplemented,
    InsufficientBalance,
    QuotaExceeded,
    Restricted,
    Unauthorized,
    Internal,
    Other,
    PaymentFailed,
    NotFound,
    BadRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::Restricted => "RESTRICTED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Other => "OTHER",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::BadRequest => "BAD_REQUEST",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Response payload. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result_type: String,
    pub result: Option<Value>,
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(result_type: impl Into<String>, result: Value) -> Self {
        Self {
            result_type: result_type.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(result_type: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result_type: result_type.into(),
            result: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
