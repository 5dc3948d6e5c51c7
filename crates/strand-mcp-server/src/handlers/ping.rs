use async_trait::async_trait;
use serde_json::{Value, json};

use strand_mcp_json_rpc::JsonRpcRequest;
use strand_mcp_protocol::McpResult;

use super::RequestHandler;
use crate::metadata::TransportMetadata;

/// `ping`: always an empty result.
pub struct PingHandler;

#[async_trait]
impl RequestHandler for PingHandler {
    async fn invoke(&self, _request: JsonRpcRequest, _metadata: &TransportMetadata) -> McpResult<Value> {
        Ok(json!({}))
    }
}
