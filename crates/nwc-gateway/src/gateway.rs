//! The `run` command: wire relays, node and engine together.

use std::sync::Arc;
use std::time::Duration;

use database::{request_event, Database};
use nip47::{Cipher, NostrRelay, RelayConfig, RelaySink};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use wallet_service::{ServiceConfig, ServiceContext, WalletService};

use crate::config::GatewayConfig;
use crate::error::Result;

/// Re-read this far behind the last recorded request on startup. Events
/// seen twice are dropped as duplicates.
const RESUME_OVERLAP_SECS: i64 = 300;

/// How long in-flight requests get to finish after Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run() -> Result<()> {
    let config = GatewayConfig::from_env()?;
    let relay_config = RelayConfig::from_env()?;
    let service_config = ServiceConfig::from_env()?;

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let backend = config.backend.connect()?;
    match backend.get_info().await {
        Ok(node) => info!(
            backend = backend.name(),
            pubkey = %node.pubkey,
            network = %node.network,
            "Connected to node"
        ),
        Err(err) => warn!(backend = backend.name(), error = %err, "Node not reachable yet"),
    }

    let cipher = Cipher::new(relay_config.keys()?);
    let relay = NostrRelay::new(relay_config).await?;
    info!(
        pubkey = %relay.public_key().to_hex(),
        relays = relay.relays().len(),
        "Wallet service identity"
    );
    if let Err(err) = relay.publish_info().await {
        warn!(error = %err, "Failed to publish info event");
    }

    let since = request_event::latest_created_at(db.pool())
        .await?
        .map(|latest| (latest - RESUME_OVERLAP_SECS).max(0) as u64);

    let ctx = Arc::new(ServiceContext::new(db.clone(), backend, cipher, service_config));

    let (inbound_tx, inbound_rx) = mpsc::channel(ctx.config.max_concurrent_requests.max(1) * 4);
    let sink: Arc<dyn RelaySink> = Arc::new(relay.clone());
    let service = WalletService::start(ctx, sink, inbound_rx);

    tokio::select! {
        result = relay.listen(inbound_tx, since) => {
            if let Err(err) = result {
                error!(error = %err, "Relay listener stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, service.join())
        .await
        .is_err()
    {
        warn!("Timed out waiting for in-flight requests");
    }
    relay.shutdown().await;
    db.close().await;
    info!("Gateway stopped");
    Ok(())
}
