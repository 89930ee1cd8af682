//! Shared fixtures: an engine over `MockNode` and an in-memory ledger, apps
//! that encrypt their own requests, and a relay sink that records what the
//! publisher sends.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use database::app::{self, NewApp};
use database::{unix_timestamp, App, BudgetRenewal, Database};
use mock_node::{MockNode, NodeBackend};
use nip47::{
    Cipher, Encryption, InboundEvent, Keys, NostrTag, OutboundResponse, PublishResult, RelaySink,
    Response, KIND_REQUEST,
};
use serde_json::Value;
use wallet_service::{process_event, ProcessOutcome, ServiceConfig, ServiceContext};

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A fresh 32-byte hex id.
pub fn next_id() -> String {
    format!("{:064x}", EVENT_COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub struct TestApp {
    pub keys: Keys,
    pub app: App,
}

impl TestApp {
    pub fn pubkey(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Encrypt `json` to the wallet and wrap it in a request event.
    pub fn request(&self, wallet: &Keys, json: &str, encryption: Encryption) -> InboundEvent {
        let content = Cipher::new(self.keys.clone())
            .encrypt(&wallet.public_key().to_hex(), json, encryption)
            .unwrap();

        let mut tags = vec![NostrTag::single("p", wallet.public_key().to_hex())];
        if let Some(tag) = encryption.response_tag() {
            tags.push(tag);
        }

        InboundEvent {
            id: next_id(),
            pubkey: self.pubkey(),
            kind: KIND_REQUEST,
            created_at: unix_timestamp() as u64,
            content,
            tags,
        }
    }

    /// Decrypt a published response addressed to this app.
    pub fn open(&self, wallet: &Keys, outbound: &OutboundResponse) -> Response {
        let json = Cipher::new(self.keys.clone())
            .decrypt(&wallet.public_key().to_hex(), &outbound.content, outbound.encryption)
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }
}

pub struct Harness {
    pub ctx: Arc<ServiceContext>,
    pub node: Arc<MockNode>,
    pub wallet: Keys,
}

impl Harness {
    pub async fn new(node: MockNode) -> Self {
        Self::with_config(node, ServiceConfig::default()).await
    }

    pub async fn with_config(node: MockNode, config: ServiceConfig) -> Self {
        let node = Arc::new(node);
        Self::with_backend(node.clone(), node, config).await
    }

    /// Serve requests through `backend`, which wraps `node`.
    pub async fn with_backend(
        node: Arc<MockNode>,
        backend: Arc<dyn NodeBackend>,
        config: ServiceConfig,
    ) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        let wallet = Keys::generate();
        let ctx = ServiceContext::new(db, backend, Cipher::new(wallet.clone()), config);
        Self {
            ctx: Arc::new(ctx),
            node,
            wallet,
        }
    }

    pub fn db(&self) -> &Database {
        &self.ctx.db
    }

    pub async fn app(
        &self,
        scopes: &[&str],
        isolated: bool,
        budget: Option<(i64, BudgetRenewal)>,
    ) -> TestApp {
        let keys = Keys::generate();
        let app = app::create_app(
            self.db().pool(),
            &NewApp {
                name: "test app".to_string(),
                pubkey: keys.public_key().to_hex(),
                isolated,
                expires_at: None,
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                budget,
            },
            unix_timestamp(),
        )
        .await
        .unwrap();
        TestApp { keys, app }
    }

    /// Every method, no budget.
    pub async fn full_access_app(&self) -> TestApp {
        self.app(&nip47::Method::ALL.map(|m| m.as_str()), false, None)
            .await
    }

    /// Run one request through decode and dispatch, returning the reply.
    pub async fn send(&self, app: &TestApp, method: &str, params: Value) -> Response {
        let json = serde_json::json!({ "method": method, "params": params }).to_string();
        let event = app.request(&self.wallet, &json, Encryption::Nip44V2);
        match self.process(event).await {
            ProcessOutcome::Replied(outgoing) => outgoing.response,
            ProcessOutcome::Skipped { reason } => panic!("request skipped: {reason}"),
        }
    }

    pub async fn process(&self, event: InboundEvent) -> ProcessOutcome {
        process_event(self.ctx.clone(), event).await
    }
}

pub fn result(response: &Response) -> &Value {
    assert!(
        response.error.is_none(),
        "unexpected error response: {:?}",
        response.error
    );
    response.result.as_ref().unwrap()
}

/// Records everything published; can be told to reject the next publishes.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<OutboundResponse>>,
    reject: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_next(&self, count: usize) {
        self.reject.store(count, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<OutboundResponse> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RelaySink for RecordingSink {
    async fn publish_response(
        &self,
        response: &OutboundResponse,
    ) -> Result<PublishResult, nip47::Error> {
        let rejected = self
            .reject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(nip47::Error::Timeout);
        }

        self.published.lock().unwrap().push(response.clone());
        Ok(PublishResult {
            event_id: next_id(),
            success: 1,
            failed: 0,
        })
    }
}
