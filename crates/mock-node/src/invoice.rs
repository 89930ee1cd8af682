//! Signed regtest invoice generation.

use std::str::FromStr;
use std::time::Duration;

use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
use node_core::BackendError;

const NODE_KEY: [u8; 32] = [0x42; 32];
const REMOTE_KEY: [u8; 32] = [0x24; 32];

/// An invoice issued by some other node, for the wallet to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInvoice {
    pub bolt11: String,
    pub payment_hash: String,
    pub preimage: String,
}

/// What a freshly signed invoice commits to.
pub(crate) struct SignedInvoice {
    pub bolt11: String,
    pub payment_hash: String,
    pub preimage: String,
    pub expires_at: i64,
}

/// Public key of the mock node, hex encoded.
pub(crate) fn node_pubkey() -> Result<String, BackendError> {
    let secret = secret_key(&NODE_KEY)?;
    Ok(PublicKey::from_secret_key(&Secp256k1::new(), &secret).to_string())
}

pub(crate) fn sign_local(
    amount_msat: u64,
    description: &str,
    description_hash: Option<&str>,
    expiry_secs: u64,
) -> Result<SignedInvoice, BackendError> {
    sign(&NODE_KEY, amount_msat, description, description_hash, expiry_secs)
}

pub(crate) fn sign_remote(amount_msat: u64, description: &str) -> Result<SignedInvoice, BackendError> {
    sign(&REMOTE_KEY, amount_msat, description, None, 3600)
}

fn secret_key(bytes: &[u8; 32]) -> Result<SecretKey, BackendError> {
    SecretKey::from_slice(bytes).map_err(|e| BackendError::Backend(e.to_string()))
}

fn sign(
    key: &[u8; 32],
    amount_msat: u64,
    description: &str,
    description_hash: Option<&str>,
    expiry_secs: u64,
) -> Result<SignedInvoice, BackendError> {
    let secret = secret_key(key)?;
    let preimage: [u8; 32] = rand::random();
    let payment_hash = sha256::Hash::hash(&preimage);

    let builder = InvoiceBuilder::new(Currency::Regtest);
    let builder = match description_hash {
        Some(hash) => {
            let hash = sha256::Hash::from_str(hash)
                .map_err(|e| BackendError::InvalidInvoice(format!("description hash: {e}")))?;
            builder.description_hash(hash)
        }
        None => builder.description(description.to_string()),
    };

    let invoice = builder
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([42u8; 32]))
        .current_timestamp()
        .min_final_cltv_expiry_delta(144)
        .amount_milli_satoshis(amount_msat)
        .expiry_time(Duration::from_secs(expiry_secs))
        .build_signed(|message| Secp256k1::new().sign_ecdsa_recoverable(message, &secret))
        .map_err(|e| BackendError::Backend(format!("invoice signing failed: {e}")))?;

    let created_at = invoice.duration_since_epoch().as_secs() as i64;

    Ok(SignedInvoice {
        bolt11: invoice.to_string(),
        payment_hash: payment_hash.to_string(),
        preimage: hex::encode(preimage),
        expires_at: created_at + expiry_secs as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_invoice_decodes() {
        let signed = sign_local(21_000, "coffee", None, 600).unwrap();
        let decoded = node_core::decode_bolt11(&signed.bolt11).unwrap();

        assert_eq!(decoded.payment_hash, signed.payment_hash);
        assert_eq!(decoded.amount_msat, Some(21_000));
        assert_eq!(decoded.expires_at, signed.expires_at);

        let preimage = hex::decode(&signed.preimage).unwrap();
        assert_eq!(sha256::Hash::hash(&preimage).to_string(), signed.payment_hash);
    }

    #[test]
    fn test_description_hash_variant() {
        let hash = sha256::Hash::hash(b"long description").to_string();
        let signed = sign_local(1_000, "", Some(&hash), 600).unwrap();
        assert!(signed.bolt11.starts_with("lnbcrt"));
        assert!(sign_local(1_000, "", Some("zz"), 600).is_err());
    }
}
