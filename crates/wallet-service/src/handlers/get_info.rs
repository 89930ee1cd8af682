use database::permission;
use serde::Serialize;
use serde_json::Value;

use super::{authorize, to_result};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct GetInfoResult {
    alias: String,
    color: String,
    pubkey: String,
    network: String,
    block_height: u32,
    block_hash: String,
    /// Methods this app may call.
    methods: Vec<String>,
}

pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let info = ctx.call(|node| async move { node.get_info().await }).await?;
    let methods = permission::list_grants(ctx.pool(), request.app.id)
        .await?
        .into_iter()
        .map(|grant| grant.scope)
        .collect();

    to_result(&GetInfoResult {
        alias: info.alias,
        color: info.color,
        pubkey: info.pubkey,
        network: info.network,
        block_height: info.block_height,
        block_hash: info.block_hash,
        methods,
    })
}
