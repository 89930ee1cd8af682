//! Nostr Wallet Connect protocol layer.
//!
//! Everything the wallet service needs to speak NIP-47 over nostr relays:
//! the JSON request/response envelopes, NIP-04 / NIP-44 payload encryption,
//! the relay client that listens for requests and publishes responses, and
//! the connection URI handed to client applications.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            NIP47                                 │
//! │                                                                  │
//! │  ┌─────────────────────┐       ┌─────────────────────┐          │
//! │  │   RelayListener     │       │   RelaySink         │          │
//! │  │   (read path)       │       │   (write path)      │          │
//! │  │                     │       │                     │          │
//! │  │ - subscribe 23194   │       │ - publish 23195     │          │
//! │  │ - InboundEvent      │       │ - publish 13194     │          │
//! │  └──────────┬──────────┘       └──────────┬──────────┘          │
//! │             │          Cipher             │                      │
//! │             ▼      (nip04 / nip44)        ▼                      │
//! │        mpsc channel                 Nostr Relays                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Event Kinds
//!
//! | Kind | Constant | Purpose |
//! |------|----------|---------|
//! | 13194 | `KIND_INFO` | Supported methods and encryption schemes |
//! | 23194 | `KIND_REQUEST` | Encrypted request from a client app |
//! | 23195 | `KIND_RESPONSE` | Encrypted response from the wallet |

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod events;
pub mod relay;
pub mod uri;

pub use config::{parse_relays, RelayConfig};
pub use crypto::{Cipher, Encryption};
pub use envelope::{ErrorBody, ErrorCode, Method, Request, Response};
pub use error::Error;
pub use events::{tag_value, InboundEvent, NostrTag};
pub use relay::{NostrRelay, OutboundResponse, PublishResult, RelaySink};
pub use uri::connection_uri;

pub use nostr_sdk::{Keys, PublicKey, SecretKey};

/// Wallet info event (replaceable).
pub const KIND_INFO: u16 = 13194;
/// Client request.
pub const KIND_REQUEST: u16 = 23194;
/// Wallet response.
pub const KIND_RESPONSE: u16 = 23195;
