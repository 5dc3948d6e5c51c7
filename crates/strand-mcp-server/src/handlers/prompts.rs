use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use strand_mcp_json_rpc::JsonRpcRequest;
use strand_mcp_protocol::{GetPromptParams, ListPromptsResult, McpResult, PaginatedParams};

use super::{RequestHandler, paginate, parse_params};
use crate::metadata::TransportMetadata;

/// `prompts/list`
pub struct PromptsListHandler;

#[async_trait]
impl RequestHandler for PromptsListHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: PaginatedParams = parse_params(request.params)?;
        debug!("Listing prompts with cursor: {:?}", params.cursor);

        let (prompts, next_cursor) = paginate(metadata.prompts().get_all(), params.cursor.as_ref(), |p| {
            p.name.as_str()
        });
        Ok(serde_json::to_value(ListPromptsResult { prompts, next_cursor })?)
    }
}

/// `prompts/get`
pub struct PromptsGetHandler;

#[async_trait]
impl RequestHandler for PromptsGetHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: GetPromptParams = parse_params(request.params)?;
        let result = metadata
            .prompts()
            .execute(&params.name, params.arguments.unwrap_or_default())
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;
    use strand_mcp_json_rpc::RequestId;
    use strand_mcp_protocol::{McpError, Prompt, PromptArgument, PromptMessage};

    use crate::prompt::McpPrompt;
    use crate::registry::PromptRegistry;

    struct Review;

    #[async_trait]
    impl McpPrompt for Review {
        fn descriptor(&self) -> Prompt {
            Prompt::new("review").with_arguments(vec![PromptArgument::new("code").required()])
        }

        async fn render(&self, arguments: HashMap<String, String>) -> McpResult<Vec<PromptMessage>> {
            Ok(vec![PromptMessage::user_text(format!(
                "Review: {}",
                arguments["code"]
            ))])
        }
    }

    fn metadata() -> TransportMetadata {
        TransportMetadata::builder("strand", "1.0.0")
            .prompts(PromptRegistry::new().with_prompt(Review))
            .build()
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let metadata = metadata();
        let list = PromptsListHandler
            .invoke(JsonRpcRequest::new(RequestId::Number(1), "prompts/list", None), &metadata)
            .await
            .unwrap();
        assert_eq!(list["prompts"][0]["name"], "review");

        let get = PromptsGetHandler
            .invoke(
                JsonRpcRequest::new(
                    RequestId::Number(2),
                    "prompts/get",
                    Some(json!({"name": "review", "arguments": {"code": "fn main() {}"}})),
                ),
                &metadata,
            )
            .await
            .unwrap();
        assert_eq!(get["messages"][0]["role"], "user");
        assert_eq!(get["messages"][0]["content"]["text"], "Review: fn main() {}");
    }

    #[tokio::test]
    async fn test_get_missing_required_argument() {
        let err = PromptsGetHandler
            .invoke(
                JsonRpcRequest::new(RequestId::Number(3), "prompts/get", Some(json!({"name": "review"}))),
                &metadata(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters(_)));
    }
}
