//! Relay client: request subscription and response publication.

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::crypto::{Encryption, ENCRYPTION_TAG};
use crate::envelope::Method;
use crate::events::{InboundEvent, NostrTag};
use crate::{Error, KIND_INFO, KIND_REQUEST, KIND_RESPONSE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: String,
    pub success: usize,
    pub failed: usize,
}

/// An encrypted response ready to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub app_pubkey: String,
    /// Nostr id of the request being answered.
    pub request_id: String,
    pub content: String,
    pub encryption: Encryption,
}

impl OutboundResponse {
    /// `p` addresses the app, `e` references the request.
    pub fn tags(&self) -> Vec<NostrTag> {
        let mut tags = vec![
            NostrTag::single("p", self.app_pubkey.clone()),
            NostrTag::single("e", self.request_id.clone()),
        ];
        if let Some(tag) = self.encryption.response_tag() {
            tags.push(tag);
        }
        tags
    }
}

/// Where responses go. Implemented by [`NostrRelay`] and by test recorders.
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn publish_response(&self, response: &OutboundResponse) -> Result<PublishResult, Error>;
}

#[derive(Clone)]
pub struct NostrRelay {
    client: Client,
    config: RelayConfig,
    public_key: PublicKey,
}

impl NostrRelay {
    pub async fn new(config: RelayConfig) -> Result<Self, Error> {
        let keys = config.keys()?;
        let public_key = keys.public_key();
        let client = Client::builder().signer(keys).build();

        for relay in &config.relays {
            client.add_relay(relay).await?;
        }

        client.connect().await;
        info!(
            pubkey = %public_key.to_hex(),
            relays = config.relays.len(),
            "Connected to nostr relays"
        );
        Ok(Self {
            client,
            config,
            public_key,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn relays(&self) -> &[String] {
        &self.config.relays
    }

    /// Announce supported methods and encryption schemes.
    pub async fn publish_info(&self) -> Result<PublishResult, Error> {
        let tags = vec![NostrTag::single(ENCRYPTION_TAG, "nip44_v2 nip04")];
        self.publish(Kind::from(KIND_INFO), Method::info_content(), tags)
            .await
    }

    /// Subscribe to requests addressed to the wallet and forward them to
    /// `sink`. Runs until the client shuts down or the receiver is dropped.
    pub async fn listen(
        &self,
        sink: mpsc::Sender<InboundEvent>,
        since: Option<u64>,
    ) -> Result<(), Error> {
        let filter = Filter::new()
            .kind(Kind::from(KIND_REQUEST))
            .pubkey(self.public_key)
            .since(since.map(Timestamp::from).unwrap_or_else(Timestamp::now));
        self.client.subscribe(filter, None).await?;
        info!("Subscribed to wallet connect requests");

        self.client
            .handle_notifications(move |notification| {
                let sink = sink.clone();
                async move {
                    if let RelayPoolNotification::Event { event, .. } = notification {
                        if event.kind.as_u16() != KIND_REQUEST {
                            return Ok(false);
                        }
                        debug!(event_id = %event.id, "Received request event");
                        if sink.send(InboundEvent::from_event(&event)).await.is_err() {
                            warn!("Request channel closed, stopping listener");
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            })
            .await?;

        Ok(())
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }

    async fn publish(
        &self,
        kind: Kind,
        content: String,
        tags: Vec<NostrTag>,
    ) -> Result<PublishResult, Error> {
        let tags = tags
            .iter()
            .map(NostrTag::to_sdk_tag)
            .collect::<Result<Vec<_>, _>>()?;

        let builder = EventBuilder::new(kind, content).tags(tags);
        let output = tokio::time::timeout(
            self.config.timeout,
            self.client.send_event_builder(builder),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        let success = output.success.len();
        let failed = output.failed.len();
        if self.config.min_acks > 0 && success < self.config.min_acks {
            return Err(Error::Quorum {
                required: self.config.min_acks,
                actual: success,
            });
        }

        let event_id = output.id().to_hex();
        info!(event_id = %event_id, kind = kind.as_u16(), success, failed, "Published nostr event");

        Ok(PublishResult {
            event_id,
            success,
            failed,
        })
    }
}

#[async_trait]
impl RelaySink for NostrRelay {
    async fn publish_response(&self, response: &OutboundResponse) -> Result<PublishResult, Error> {
        self.publish(
            Kind::from(KIND_RESPONSE),
            response.content.clone(),
            response.tags(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tag_value;

    #[test]
    fn test_response_tags() {
        let response = OutboundResponse {
            app_pubkey: "aa".repeat(32),
            request_id: "bb".repeat(32),
            content: "ciphertext".to_string(),
            encryption: Encryption::Nip44V2,
        };
        let tags = response.tags();
        assert_eq!(tag_value(&tags, "p"), Some("aa".repeat(32).as_str()));
        assert_eq!(tag_value(&tags, "e"), Some("bb".repeat(32).as_str()));
        assert_eq!(tag_value(&tags, "encryption"), Some("nip44_v2"));

        let nip04 = OutboundResponse {
            encryption: Encryption::Nip04,
            ..response
        };
        assert_eq!(nip04.tags().len(), 2);
    }
}
