use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nostr client error: {0}")]
    NostrClient(#[from] nostr_sdk::client::Error),
    #[error("nostr key error: {0}")]
    NostrKey(#[from] nostr_sdk::nostr::key::Error),
    #[error("nostr tag error: {0}")]
    NostrTag(#[from] nostr_sdk::nostr::event::tag::Error),
    #[error("nip04 error: {0}")]
    Nip04(#[from] nostr_sdk::nips::nip04::Error),
    #[error("nip44 error: {0}")]
    Nip44(#[from] nostr_sdk::nips::nip44::Error),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing env var: {0}")]
    MissingEnv(&'static str),
    #[error("invalid env var {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("unknown encryption scheme: {0}")]
    UnknownEncryption(String),
    #[error("publish quorum failed: required {required}, got {actual}")]
    Quorum { required: usize, actual: usize },
    #[error("operation timed out")]
    Timeout,
}
