use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{authorize, parse_params, to_result};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
struct ConnectPeerParams {
    pubkey: String,
    host: String,
    #[serde(default)]
    port: Option<u16>,
}

impl ConnectPeerParams {
    /// `pubkey@host[:port]`
    fn node_uri(&self) -> String {
        match self.port {
            Some(port) => format!("{}@{}:{}", self.pubkey, self.host, port),
            None => format!("{}@{}", self.pubkey, self.host),
        }
    }
}

#[derive(Debug, Serialize)]
struct ConnectPeerResult {
    peer_id: String,
}

pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let params: ConnectPeerParams = parse_params(request)?;
    if params.pubkey.is_empty() || params.host.is_empty() {
        return Err(ServiceError::BadRequest("pubkey and host are required".to_string()));
    }

    let uri = params.node_uri();
    let peer_id = ctx
        .call(move |node| async move { node.connect_peer(&uri).await })
        .await?;

    info!(app_id = request.app.id, peer_id = %peer_id, "Connected peer");
    to_result(&ConnectPeerResult { peer_id })
}
