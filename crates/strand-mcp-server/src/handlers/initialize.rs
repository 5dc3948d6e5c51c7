use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use strand_mcp_json_rpc::JsonRpcRequest;
use strand_mcp_protocol::{
    Implementation, InitializeParams, InitializeResult, McpResult, McpVersion, PromptsCapabilities,
    ResourcesCapabilities, ServerCapabilities, ToolsCapabilities,
};

use super::{RequestHandler, parse_params};
use crate::metadata::TransportMetadata;

/// `initialize`: version negotiation and capability advertisement.
pub struct InitializeHandler;

impl InitializeHandler {
    /// Only capabilities with at least one registered entry are advertised.
    pub fn capabilities(metadata: &TransportMetadata) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!metadata.tools().is_empty()).then(|| ToolsCapabilities {
                list_changed: Some(false),
            }),
            prompts: (!metadata.prompts().is_empty()).then(|| PromptsCapabilities {
                list_changed: Some(false),
            }),
            resources: (!metadata.resources().is_empty()).then(|| ResourcesCapabilities {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            experimental: None,
        }
    }
}

#[async_trait]
impl RequestHandler for InitializeHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: InitializeParams = parse_params(request.params)?;
        let version = McpVersion::negotiate(&params.protocol_version);

        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = %version,
            "Client initializing"
        );

        let result = InitializeResult {
            protocol_version: version.as_str().to_string(),
            capabilities: Self::capabilities(metadata),
            server_info: Implementation::new(metadata.server_name(), metadata.version()),
            instructions: metadata.instructions().map(str::to_string),
        };
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_mcp_json_rpc::RequestId;

    use crate::registry::ToolRegistry;
    use crate::tool::FnTool;
    use strand_mcp_protocol::{CallToolResult, Tool, ToolSchema};

    fn request(version: &str) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RequestId::Number(1),
            "initialize",
            Some(json!({
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            })),
        )
    }

    #[tokio::test]
    async fn test_negotiates_supported_version() {
        let metadata = TransportMetadata::builder("strand", "1.0.0").build();
        let result = InitializeHandler
            .invoke(request("2025-03-26"), &metadata)
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"], json!({"name": "strand", "version": "1.0.0"}));
        assert_eq!(result["capabilities"], json!({}));
        assert!(result.get("instructions").is_none());
    }

    #[tokio::test]
    async fn test_unknown_version_gets_latest_and_tools_advertised() {
        let tools = ToolRegistry::new().with_tool(FnTool::new(
            Tool::new("noop", ToolSchema::object()),
            |_, _| Box::pin(async { Ok(CallToolResult::text("")) }),
        ));
        let metadata = TransportMetadata::builder("strand", "1.0.0")
            .instructions("Use the tools")
            .tools(tools)
            .build();

        let result = InitializeHandler.invoke(request("1999-01-01"), &metadata).await.unwrap();
        assert_eq!(result["protocolVersion"], McpVersion::LATEST.as_str());
        assert_eq!(result["capabilities"], json!({"tools": {"listChanged": false}}));
        assert_eq!(result["instructions"], "Use the tools");
    }

    #[tokio::test]
    async fn test_missing_client_info_is_invalid_params() {
        let metadata = TransportMetadata::builder("strand", "1.0.0").build();
        let request = JsonRpcRequest::new(RequestId::Number(1), "initialize", None);
        assert!(InitializeHandler.invoke(request, &metadata).await.is_err());
    }
}
