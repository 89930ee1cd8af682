use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrTag {
    pub name: String,
    pub values: Vec<String>,
}

impl NostrTag {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, vec![value.into()])
    }

    pub fn to_sdk_tag(&self) -> Result<Tag, Error> {
        let mut parts = Vec::with_capacity(1 + self.values.len());
        parts.push(self.name.clone());
        parts.extend(self.values.clone());
        Ok(Tag::parse(parts)?)
    }

    pub fn from_sdk_tag(tag: &Tag) -> Self {
        let parts = tag.clone().to_vec();
        let name = parts.first().cloned().unwrap_or_default();
        let values = parts.into_iter().skip(1).collect();
        Self { name, values }
    }
}

/// A request event as received from a relay, reduced to the fields the
/// wallet service reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: String,
    /// Sender public key (hex), identifies the client app.
    pub pubkey: String,
    pub kind: u16,
    pub created_at: u64,
    /// Encrypted request payload.
    pub content: String,
    pub tags: Vec<NostrTag>,
}

impl InboundEvent {
    pub fn from_event(event: &Event) -> Self {
        let tags = event.tags.iter().map(NostrTag::from_sdk_tag).collect();

        Self {
            id: event.id.to_hex(),
            pubkey: event.pubkey.to_hex(),
            kind: event.kind.as_u16(),
            created_at: event.created_at.as_secs(),
            content: event.content.clone(),
            tags,
        }
    }
}

pub fn tag_value<'a>(tags: &'a [NostrTag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.name == name)
        .and_then(|tag| tag.values.first().map(|s| s.as_str()))
}
