use nostr_sdk::prelude::*;

/// `nostr+walletconnect://<wallet pubkey>?relay=...&secret=...`
pub fn connection_uri(wallet_pubkey: &PublicKey, relays: &[String], app_secret: &SecretKey) -> String {
    let mut uri = format!("nostr+walletconnect://{}?", wallet_pubkey.to_hex());
    for relay in relays {
        uri.push_str("relay=");
        uri.push_str(&percent_encode(relay));
        uri.push('&');
    }
    uri.push_str("secret=");
    uri.push_str(&app_secret.to_secret_hex());
    uri
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
