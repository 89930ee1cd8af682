//! Event handling end to end: decoding, replies and delivery.

mod common;

use std::time::Duration;

use common::{result, Harness, RecordingSink};
use database::response_event;
use mock_node::{Channel, MockNode};
use nip47::{tag_value, Encryption, ErrorCode, Keys};
use serde_json::json;
use tokio::sync::mpsc;
use wallet_service::{ProcessOutcome, Publisher, ServiceConfig, WalletService};

#[tokio::test]
async fn test_duplicate_event_is_processed_once() {
    let harness = Harness::new(MockNode::new().with_balance(1_000)).await;
    let app = harness.full_access_app().await;
    let event = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip44V2,
    );

    assert!(matches!(
        harness.process(event.clone()).await,
        ProcessOutcome::Replied(_)
    ));
    assert!(matches!(
        harness.process(event).await,
        ProcessOutcome::Skipped { .. }
    ));
}

#[tokio::test]
async fn test_unknown_app_gets_no_reply() {
    let harness = Harness::new(MockNode::new()).await;
    let stranger = common::TestApp {
        keys: Keys::generate(),
        app: harness.full_access_app().await.app,
    };
    let event = stranger.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip04,
    );

    let ProcessOutcome::Skipped { reason } = harness.process(event).await else {
        panic!("unknown app was answered");
    };
    assert!(reason.contains("unknown app"));
}

#[tokio::test]
async fn test_disabled_app_gets_no_reply() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;
    database::app::disable_app(harness.db().pool(), &app.pubkey())
        .await
        .unwrap();

    let event = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip44V2,
    );
    assert!(matches!(
        harness.process(event).await,
        ProcessOutcome::Skipped { .. }
    ));
}

#[tokio::test]
async fn test_undecryptable_content_is_dropped() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;
    let mut event = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip44V2,
    );
    event.content = "not ciphertext".to_string();

    let ProcessOutcome::Skipped { reason } = harness.process(event).await else {
        panic!("garbage was answered");
    };
    assert!(reason.contains("decryption failed"));
}

#[tokio::test]
async fn test_malformed_request_gets_bad_request() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;
    let event = app.request(&harness.wallet, "{not json", Encryption::Nip44V2);
    let request_id = event.id.clone();

    let ProcessOutcome::Replied(outgoing) = harness.process(event).await else {
        panic!("malformed request from a known app must be answered");
    };
    assert_eq!(outgoing.target.request_nostr_id, request_id);
    assert_eq!(outgoing.response.error_code(), Some(ErrorCode::BadRequest));
    assert_eq!(outgoing.response.result_type, "");
}

#[tokio::test]
async fn test_unknown_method_is_not_implemented() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;

    let response = harness.send(&app, "pay_keysend", json!({})).await;
    assert_eq!(response.result_type, "pay_keysend");
    assert_eq!(response.error_code(), Some(ErrorCode::NotImplemented));
}

#[tokio::test]
async fn test_invalid_params_are_bad_request() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;

    let response = harness
        .send(&app, "make_invoice", json!({ "amount": "lots" }))
        .await;
    assert_eq!(response.error_code(), Some(ErrorCode::BadRequest));

    let response = harness.send(&app, "lookup_invoice", json!({})).await;
    assert_eq!(response.error_code(), Some(ErrorCode::BadRequest));
}

#[tokio::test]
async fn test_expired_app_is_unauthorized() {
    let harness = Harness::new(MockNode::new()).await;
    let keys = Keys::generate();
    let app = database::app::create_app(
        harness.db().pool(),
        &database::app::NewApp {
            name: "expired".to_string(),
            pubkey: keys.public_key().to_hex(),
            isolated: false,
            expires_at: Some(1),
            scopes: vec!["get_balance".to_string()],
            budget: None,
        },
        0,
    )
    .await
    .unwrap();
    let app = common::TestApp { keys, app };

    let response = harness.send(&app, "get_balance", json!({})).await;
    assert_eq!(response.error_code(), Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn test_get_info_lists_granted_methods() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness
        .app(&["get_info", "get_balance"], false, None)
        .await;

    let response = harness.send(&app, "get_info", json!({})).await;
    let info = result(&response);
    assert_eq!(info["network"], "regtest");
    assert_eq!(info["alias"], "mock");
    let mut methods: Vec<&str> = info["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    methods.sort_unstable();
    assert_eq!(methods, vec!["get_balance", "get_info"]);
}

#[tokio::test]
async fn test_backend_outage_is_internal() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;
    harness.node.set_unavailable(true);

    let response = harness.send(&app, "get_balance", json!({})).await;
    assert_eq!(response.error_code(), Some(ErrorCode::Internal));
}

#[tokio::test]
async fn test_make_and_lookup_invoice() {
    let harness = Harness::new(MockNode::new()).await;
    let app = harness.full_access_app().await;

    let made = harness
        .send(
            &app,
            "make_invoice",
            json!({ "amount": 42_000, "description": "pizza", "expiry": 600 }),
        )
        .await;
    let made = result(&made).clone();
    assert_eq!(made["type"], "incoming");
    assert_eq!(made["state"], "pending");
    assert_eq!(made["amount"], 42_000);
    assert_eq!(made["description"], "pizza");
    assert_eq!(made["preimage"], "");
    let payment_hash = made["payment_hash"].as_str().unwrap().to_string();

    let looked_up = harness
        .send(&app, "lookup_invoice", json!({ "payment_hash": payment_hash }))
        .await;
    assert_eq!(result(&looked_up)["state"], "pending");

    harness.node.receive_payment(&payment_hash).unwrap();
    let looked_up = harness
        .send(&app, "lookup_invoice", json!({ "invoice": made["invoice"] }))
        .await;
    assert_eq!(result(&looked_up)["state"], "settled");
    assert_ne!(result(&looked_up)["preimage"], "");
    assert!(result(&looked_up)["settled_at"].is_i64());
}

#[tokio::test]
async fn test_lookup_of_foreign_invoice_is_not_found() {
    let harness = Harness::new(MockNode::new()).await;
    let owner = harness.full_access_app().await;
    let other = harness.full_access_app().await;

    let made = harness
        .send(&owner, "make_invoice", json!({ "amount": 1_000 }))
        .await;
    let payment_hash = result(&made)["payment_hash"].clone();

    let response = harness
        .send(&other, "lookup_invoice", json!({ "payment_hash": payment_hash }))
        .await;
    assert_eq!(response.error_code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn test_list_channels_and_connect_peer() {
    let channel = Channel {
        peer_id: format!("02{}", "11".repeat(32)),
        local_msat: 400_000,
        total_msat: 1_000_000,
        funding_tx_id: "aa".repeat(32),
        channel_id: "bb".repeat(32),
    };
    let harness = Harness::new(MockNode::new().with_channels(vec![channel])).await;
    let app = harness.full_access_app().await;

    let response = harness.send(&app, "list_channels", json!({})).await;
    let channels = result(&response)["channels"].as_array().unwrap().clone();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["local_msat"], 400_000);

    let peer = format!("03{}", "22".repeat(32));
    let response = harness
        .send(
            &app,
            "connect_peer",
            json!({ "pubkey": peer, "host": "127.0.0.1", "port": 9735 }),
        )
        .await;
    assert_eq!(result(&response)["peer_id"], peer);
}

#[tokio::test]
async fn test_responses_are_published_with_request_tags() {
    let harness = Harness::new(MockNode::new().with_balance(5_000)).await;
    let app = harness.full_access_app().await;
    let sink = RecordingSink::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(16);

    let service = WalletService::start(harness.ctx.clone(), sink.clone(), inbound_rx);

    let nip44 = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip44V2,
    );
    let nip04 = app.request(
        &harness.wallet,
        r#"{"method":"get_balance"}"#,
        Encryption::Nip04,
    );
    inbound_tx.send(nip44.clone()).await.unwrap();
    inbound_tx.send(nip04.clone()).await.unwrap();
    drop(inbound_tx);
    tokio::time::timeout(Duration::from_secs(10), service.join())
        .await
        .unwrap();

    let published = sink.published();
    assert_eq!(published.len(), 2);
    for (event, encryption) in [(&nip44, Encryption::Nip44V2), (&nip04, Encryption::Nip04)] {
        let outbound = published
            .iter()
            .find(|outbound| outbound.request_id == event.id)
            .unwrap();
        assert_eq!(outbound.encryption, encryption);
        let tags = outbound.tags();
        assert_eq!(tag_value(&tags, "p"), Some(app.pubkey().as_str()));
        assert_eq!(tag_value(&tags, "e"), Some(event.id.as_str()));
        assert_eq!(
            tag_value(&tags, "encryption"),
            (encryption == Encryption::Nip44V2).then_some("nip44_v2")
        );

        let response = app.open(&harness.wallet, outbound);
        assert_eq!(response.result_type, "get_balance");
        assert_eq!(result(&response)["balance"], 5_000);
    }
}

#[tokio::test]
async fn test_rejected_publish_is_retried_from_outbox() {
    let harness = Harness::with_config(MockNode::new().with_balance(5_000), ServiceConfig::default())
        .await;
    let app = harness.full_access_app().await;
    let sink = RecordingSink::new();
    let publisher = Publisher::new(
        harness.db().clone(),
        harness.ctx.cipher.clone(),
        sink.clone(),
        Duration::from_secs(60),
    );

    let event = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip44V2,
    );
    let ProcessOutcome::Replied(outgoing) = harness.process(event.clone()).await else {
        panic!("request was skipped");
    };

    sink.reject_next(1);
    assert!(!publisher.deliver(outgoing).await.unwrap());
    assert!(sink.published().is_empty());

    let pending = response_event::list_pending_responses(harness.db().pool(), 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    assert_eq!(publisher.retry_pending().await, 1);
    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].request_id, event.id);
    assert!(response_event::list_pending_responses(harness.db().pool(), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_response_held_while_outbox_fails() {
    let harness = Harness::new(MockNode::new().with_balance(5_000)).await;
    let app = harness.full_access_app().await;
    let sink = RecordingSink::new();
    let publisher = Publisher::new(
        harness.db().clone(),
        harness.ctx.cipher.clone(),
        sink.clone(),
        Duration::from_secs(60),
    );

    let event = app.request(
        &harness.wallet,
        r#"{"method":"get_balance","params":{}}"#,
        Encryption::Nip04,
    );
    let ProcessOutcome::Replied(outgoing) = harness.process(event.clone()).await else {
        panic!("request was skipped");
    };

    sqlx::query(
        "CREATE TRIGGER outbox_offline BEFORE INSERT ON response_events \
         BEGIN SELECT RAISE(ABORT, 'outbox offline'); END",
    )
    .execute(harness.db().pool())
    .await
    .unwrap();

    publisher.submit(outgoing).await;
    assert!(sink.published().is_empty());
    assert_eq!(publisher.backlog_len().await, 1);

    // Still failing: the response stays held.
    assert_eq!(publisher.retry_pending().await, 0);
    assert_eq!(publisher.backlog_len().await, 1);

    sqlx::query("DROP TRIGGER outbox_offline")
        .execute(harness.db().pool())
        .await
        .unwrap();

    assert_eq!(publisher.retry_pending().await, 1);
    assert_eq!(publisher.backlog_len().await, 0);
    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].request_id, event.id);
    assert_eq!(published[0].encryption, Encryption::Nip04);
}
