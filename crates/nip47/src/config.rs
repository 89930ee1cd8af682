use std::env;
use std::time::Duration;

use nostr_sdk::prelude::*;

use crate::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MIN_ACKS: usize = 1;

/// Relay connection settings for the wallet service.
#[derive(Clone)]
pub struct RelayConfig {
    pub relays: Vec<String>,
    /// Wallet service secret key, hex or nsec.
    pub secret_key: String,
    /// Relays that must accept a publish for it to count as delivered.
    pub min_acks: usize,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn keys(&self) -> Result<Keys, Error> {
        Ok(Keys::parse(&self.secret_key)?)
    }

    /// Load from `NOSTR_RELAYS`, `NWC_SECRET_KEY`, `NWC_MIN_ACKS` and
    /// `NWC_PUBLISH_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        let relays = match env::var("NOSTR_RELAYS") {
            Ok(value) => parse_relays(&value),
            Err(_) => Vec::new(),
        };
        if relays.is_empty() {
            return Err(Error::MissingEnv("NOSTR_RELAYS"));
        }

        let secret_key =
            env::var("NWC_SECRET_KEY").map_err(|_| Error::MissingEnv("NWC_SECRET_KEY"))?;
        let min_acks = parse_env("NWC_MIN_ACKS", DEFAULT_MIN_ACKS)?;
        let timeout_secs = parse_env("NWC_PUBLISH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            relays,
            secret_key,
            min_acks,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, Error> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidEnv { name, value }),
        Err(_) => Ok(default),
    }
}

/// Split a comma or whitespace separated relay list.
pub fn parse_relays(value: &str) -> Vec<String> {
    value
        .split(',')
        .flat_map(|chunk| chunk.split_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
