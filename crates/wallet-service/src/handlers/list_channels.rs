use node_core::Channel;
use serde::Serialize;
use serde_json::Value;

use super::{authorize, to_result};
use crate::context::ServiceContext;
use crate::decoder::DecodedRequest;
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct ListChannelsResult {
    channels: Vec<Channel>,
}

pub async fn handle(ctx: &ServiceContext, request: &DecodedRequest) -> Result<Value, ServiceError> {
    authorize(ctx, request, None).await?;

    let channels = ctx.call(|node| async move { node.list_channels().await }).await?;
    to_result(&ListChannelsResult { channels })
}
