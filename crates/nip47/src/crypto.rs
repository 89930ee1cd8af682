//! Payload encryption between the wallet service and client apps.

use nostr_sdk::nips::nip04;
use nostr_sdk::nips::nip44::{self, Version};
use nostr_sdk::prelude::*;

use crate::events::{tag_value, NostrTag};
use crate::Error;

/// Tag name carrying the encryption scheme of a request or response.
pub const ENCRYPTION_TAG: &str = "encryption";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    Nip04,
    Nip44V2,
}

impl Encryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encryption::Nip04 => "nip04",
            Encryption::Nip44V2 => "nip44_v2",
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "nip04" => Ok(Encryption::Nip04),
            "nip44_v2" => Ok(Encryption::Nip44V2),
            other => Err(Error::UnknownEncryption(other.to_string())),
        }
    }

    /// NIP-44 v2 when the request asks for it, NIP-04 otherwise.
    pub fn from_tags(tags: &[NostrTag]) -> Self {
        match tag_value(tags, ENCRYPTION_TAG) {
            Some(value) if value.split_whitespace().any(|v| v == "nip44_v2") => {
                Encryption::Nip44V2
            }
            _ => Encryption::Nip04,
        }
    }

    /// Tag to attach to a response. NIP-04 replies carry none.
    pub fn response_tag(&self) -> Option<NostrTag> {
        match self {
            Encryption::Nip04 => None,
            Encryption::Nip44V2 => Some(NostrTag::single(ENCRYPTION_TAG, self.as_str())),
        }
    }
}

/// Encrypts and decrypts payloads with the wallet service key.
#[derive(Clone)]
pub struct Cipher {
    keys: Keys,
}

impl Cipher {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub fn decrypt(
        &self,
        sender_pubkey: &str,
        content: &str,
        encryption: Encryption,
    ) -> Result<String, Error> {
        let sender = PublicKey::parse(sender_pubkey)?;
        let secret = self.keys.secret_key();
        let plaintext = match encryption {
            Encryption::Nip04 => nip04::decrypt(secret, &sender, content)?,
            Encryption::Nip44V2 => nip44::decrypt(secret, &sender, content)?,
        };
        Ok(plaintext)
    }

    pub fn encrypt(
        &self,
        recipient_pubkey: &str,
        plaintext: &str,
        encryption: Encryption,
    ) -> Result<String, Error> {
        let recipient = PublicKey::parse(recipient_pubkey)?;
        let secret = self.keys.secret_key();
        let content = match encryption {
            Encryption::Nip04 => nip04::encrypt(secret, &recipient, plaintext)?,
            Encryption::Nip44V2 => nip44::encrypt(secret, &recipient, plaintext, Version::V2)?,
        };
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_encryption_from_tags() {
        assert_eq!(Encryption::from_tags(&[]), Encryption::Nip04);
        assert_eq!(
            Encryption::from_tags(&[NostrTag::single("encryption", "nip44_v2")]),
            Encryption::Nip44V2
        );
        assert_eq!(
            Encryption::from_tags(&[NostrTag::single("encryption", "nip04")]),
            Encryption::Nip04
        );
    }

    #[test]
    fn test_response_tag_only_for_nip44() {
        assert_eq!(Encryption::Nip04.response_tag(), None);
        assert_eq!(
            Encryption::Nip44V2.response_tag(),
            Some(NostrTag::single("encryption", "nip44_v2"))
        );
    }

    #[test]
    fn test_decrypts_app_payloads() {
        let service = Keys::generate();
        let app = Keys::generate();
        let cipher = Cipher::new(service.clone());
        let payload = r#"{"method":"get_balance","params":{}}"#;

        let v2 = nip44::encrypt(app.secret_key(), &service.public_key(), payload, Version::V2)
            .unwrap();
        let decrypted = cipher
            .decrypt(&app.public_key().to_hex(), &v2, Encryption::Nip44V2)
            .unwrap();
        assert_eq!(decrypted, payload);

        let v1 = nip04::encrypt(app.secret_key(), &service.public_key(), payload).unwrap();
        let decrypted = cipher
            .decrypt(&app.public_key().to_hex(), &v1, Encryption::Nip04)
            .unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let service = Keys::generate();
        let app = Keys::generate();
        let stranger = Keys::generate();
        let cipher = Cipher::new(service.clone());

        let content =
            nip44::encrypt(stranger.secret_key(), &service.public_key(), "{}", Version::V2)
                .unwrap();
        let result = cipher.decrypt(&app.public_key().to_hex(), &content, Encryption::Nip44V2);
        assert!(result.is_err());
    }

    #[test]
    fn test_app_can_read_responses() {
        let service = Keys::generate();
        let app = Keys::generate();
        let cipher = Cipher::new(service.clone());

        let content = cipher
            .encrypt(&app.public_key().to_hex(), "hello", Encryption::Nip44V2)
            .unwrap();
        let plaintext = nip44::decrypt(app.secret_key(), &service.public_key(), &content).unwrap();
        assert_eq!(plaintext, "hello");
    }
}
