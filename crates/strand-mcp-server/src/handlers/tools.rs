use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use strand_mcp_json_rpc::JsonRpcRequest;
use strand_mcp_protocol::{CallToolParams, ListToolsResult, McpResult, PaginatedParams};

use super::{RequestHandler, paginate, parse_params};
use crate::metadata::TransportMetadata;
use crate::tool::ToolContext;

/// `tools/list`
pub struct ToolsListHandler;

#[async_trait]
impl RequestHandler for ToolsListHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: PaginatedParams = parse_params(request.params)?;
        debug!("Listing tools with cursor: {:?}", params.cursor);

        let (tools, next_cursor) = paginate(metadata.tools().get_all(), params.cursor.as_ref(), |t| {
            t.name.as_str()
        });
        Ok(serde_json::to_value(ListToolsResult { tools, next_cursor })?)
    }
}

/// `tools/call`. The call is cancellable through `notifications/cancelled`
/// for as long as it runs.
pub struct ToolsCallHandler;

#[async_trait]
impl RequestHandler for ToolsCallHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: CallToolParams = parse_params(request.params)?;
        let args: Map<String, Value> = params.arguments.unwrap_or_default().into_iter().collect();

        // released on drop, including when the caller abandons this future
        let registration = metadata
            .cancellations()
            .register(metadata.cancellation_scope(), request.id.clone());
        let context = ToolContext::new(request.id.clone(), registration.handle().clone());

        let result = metadata
            .tools()
            .execute(&params.name, Value::Object(args), context)
            .await;
        drop(registration);

        Ok(serde_json::to_value(result?)?)
    }
}
