use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use strand_mcp_json_rpc::JsonRpcRequest;
use strand_mcp_protocol::{
    ListResourceTemplatesResult, ListResourcesResult, McpResult, PaginatedParams, ReadResourceParams,
};

use super::{RequestHandler, paginate, parse_params};
use crate::metadata::TransportMetadata;

/// `resources/list`
pub struct ResourcesListHandler;

#[async_trait]
impl RequestHandler for ResourcesListHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: PaginatedParams = parse_params(request.params)?;
        debug!("Listing resources with cursor: {:?}", params.cursor);

        let (resources, next_cursor) = paginate(
            metadata.resources().get_all(),
            params.cursor.as_ref(),
            |r| r.uri.as_str(),
        );
        Ok(serde_json::to_value(ListResourcesResult {
            resources,
            next_cursor,
        })?)
    }
}

/// `resources/read`
pub struct ResourcesReadHandler;

#[async_trait]
impl RequestHandler for ResourcesReadHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: ReadResourceParams = parse_params(request.params)?;
        let result = metadata.resources().execute(&params.uri).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// `resources/templates/list`
pub struct ResourceTemplatesListHandler;

#[async_trait]
impl RequestHandler for ResourceTemplatesListHandler {
    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value> {
        let params: PaginatedParams = parse_params(request.params)?;

        let (resource_templates, next_cursor) = paginate(
            metadata.resources().get_all_templates(),
            params.cursor.as_ref(),
            |t| t.uri_template.as_str(),
        );
        Ok(serde_json::to_value(ListResourceTemplatesResult {
            resource_templates,
            next_cursor,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use strand_mcp_json_rpc::RequestId;
    use strand_mcp_protocol::{McpError, ResourceContents, ResourceTemplate};

    use crate::registry::ResourceRegistry;
    use crate::resource::{McpResourceTemplate, TextResource};

    struct UserTemplate;

    #[async_trait]
    impl McpResourceTemplate for UserTemplate {
        fn descriptor(&self) -> ResourceTemplate {
            ResourceTemplate::new("users://{id}", "user")
        }

        async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContents>> {
            let id = uri.trim_start_matches("users://");
            Ok(vec![ResourceContents::text(uri, format!("user {}", id))])
        }
    }

    fn metadata() -> TransportMetadata {
        TransportMetadata::builder("strand", "1.0.0")
            .resources(
                ResourceRegistry::new()
                    .with_resource(TextResource::new("memo://notes", "notes", "remember"))
                    .with_template(UserTemplate),
            )
            .build()
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(RequestId::Number(1), method, params)
    }

    #[tokio::test]
    async fn test_list_read_and_templates() {
        let metadata = metadata();

        let list = ResourcesListHandler
            .invoke(request("resources/list", None), &metadata)
            .await
            .unwrap();
        assert_eq!(list["resources"][0]["uri"], "memo://notes");

        let read = ResourcesReadHandler
            .invoke(request("resources/read", Some(json!({"uri": "memo://notes"}))), &metadata)
            .await
            .unwrap();
        assert_eq!(read["contents"][0]["text"], "remember");

        let templated = ResourcesReadHandler
            .invoke(request("resources/read", Some(json!({"uri": "users://42"}))), &metadata)
            .await
            .unwrap();
        assert_eq!(templated["contents"][0]["text"], "user 42");

        let templates = ResourceTemplatesListHandler
            .invoke(request("resources/templates/list", None), &metadata)
            .await
            .unwrap();
        assert_eq!(templates["resourceTemplates"][0]["uriTemplate"], "users://{id}");
    }

    #[tokio::test]
    async fn test_read_requires_uri() {
        let err = ResourcesReadHandler
            .invoke(request("resources/read", None), &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters(_)));
    }
}
