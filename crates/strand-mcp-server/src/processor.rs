//! Single-message pipeline: decode, route, invoke, encode.
//!
//! Batches are rejected with Invalid Request. Methods with no registered
//! handler are dropped without a response. Notifications are never
//! answered; their failures are logged. A handler error becomes an Internal
//! Error response keyed by the request id.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use strand_mcp_json_rpc::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcResponse, Message, RequestId,
    ValidationError,
};

use crate::handlers::{Handler, HandlerRegistry};
use crate::metadata::TransportMetadata;

/// What the `id` member of an inbound message turned out to be.
#[derive(Debug, Clone, PartialEq)]
enum IdField {
    Absent,
    Valid(RequestId),
    Invalid,
}

impl IdField {
    fn extract(value: &Value) -> Self {
        match value.get("id") {
            None | Some(Value::Null) => IdField::Absent,
            Some(id) => RequestId::from_value(id).map_or(IdField::Invalid, IdField::Valid),
        }
    }

    fn request_id(&self) -> Option<RequestId> {
        match self {
            IdField::Valid(id) => Some(id.clone()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct MessageProcessor {
    handlers: Arc<HandlerRegistry>,
}

impl MessageProcessor {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }

    /// Processor over [`HandlerRegistry::standard`].
    pub fn standard() -> Self {
        Self::new(Arc::new(HandlerRegistry::standard()))
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Process one raw message, returning the serialized response if any.
    pub async fn process(&self, raw: &str, metadata: &TransportMetadata) -> Option<String> {
        self.process_message(raw, metadata)
            .await
            .map(|reply| reply.to_json_string())
    }

    /// Like [`MessageProcessor::process`] but returns the typed reply.
    pub async fn process_message(&self, raw: &str, metadata: &TransportMetadata) -> Option<JsonRpcMessage> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Unparseable message");
                return Some(JsonRpcError::parse_error().into());
            }
        };
        self.process_value(value, metadata).await
    }

    /// Process an already decoded JSON value.
    pub async fn process_value(&self, value: Value, metadata: &TransportMetadata) -> Option<JsonRpcMessage> {
        if value.is_array() {
            warn!("Rejecting batch request");
            return Some(reject(None, ValidationError::BatchNotSupported));
        }
        if !value.is_object() {
            return Some(reject(None, ValidationError::NotAnObject));
        }

        let id = IdField::extract(&value);
        let Some(method) = value.get("method").and_then(Value::as_str).map(str::to_string) else {
            debug!(id = ?id, "Message without a method, dropping");
            return None;
        };

        let Some(handler) = self.handlers.get(&method).cloned() else {
            debug!(method = %method, "No handler registered, dropping");
            return None;
        };

        let message = match Message::from_value(value) {
            Ok(message) => message,
            Err(e) => return self.malformed(&method, id, e),
        };

        match handler {
            Handler::Notification(handler) => {
                let notification = match handler.build(message) {
                    Ok(notification) => notification,
                    Err(e) => return self.malformed(&method, id, e),
                };
                if let Err(e) = handler.invoke(notification, metadata).await {
                    warn!(method = %method, error = %e, "Notification handler failed");
                }
                None
            }
            Handler::Request(handler) => {
                let request = match handler.build(message) {
                    Ok(request) => request,
                    Err(e) => return self.malformed(&method, id, e),
                };
                let request_id = request.id.clone();
                match handler.invoke(request, metadata).await {
                    Ok(result) => Some(JsonRpcResponse::new(request_id, result).into()),
                    Err(e) => {
                        debug!(method = %method, id = %request_id, error = %e, "Request handler failed");
                        Some(JsonRpcError::internal_error(Some(request_id), e.to_string()).into())
                    }
                }
            }
        }
    }

    /// A message that could not be built into its typed form. Only messages
    /// that carried an id are answered.
    fn malformed(&self, method: &str, id: IdField, error: ValidationError) -> Option<JsonRpcMessage> {
        warn!(method = %method, error = %error, "Malformed message");
        match id {
            IdField::Absent => None,
            other => Some(reject(other.request_id(), error)),
        }
    }
}

fn reject(id: Option<RequestId>, error: ValidationError) -> JsonRpcMessage {
    let error: JsonRpcErrorObject = error.to_error_object();
    JsonRpcError::new(id, error).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use strand_mcp_json_rpc::{JsonRpcNotification, JsonRpcRequest, error_codes};
    use strand_mcp_protocol::{McpError, McpResult};
    use tracing_test::traced_test;

    use crate::handlers::{NotificationHandler, RequestHandler};

    fn metadata() -> TransportMetadata {
        TransportMetadata::builder("strand", "1.0.0").build()
    }

    async fn run(processor: &MessageProcessor, raw: &str) -> Option<Value> {
        processor
            .process(raw, &metadata())
            .await
            .map(|s| serde_json::from_str(&s).unwrap())
    }

    struct Failing;

    #[async_trait]
    impl RequestHandler for Failing {
        async fn invoke(&self, _request: JsonRpcRequest, _metadata: &TransportMetadata) -> McpResult<Value> {
            Err(McpError::tool_execution("disk on fire"))
        }
    }

    struct Chatty;

    #[async_trait]
    impl NotificationHandler for Chatty {
        async fn invoke(&self, _n: JsonRpcNotification, _metadata: &TransportMetadata) -> McpResult<()> {
            Err(McpError::ProtocolViolation("listener exploded".to_string()))
        }
    }

    fn processor() -> MessageProcessor {
        let mut registry = HandlerRegistry::standard();
        registry.register_request("test/fail", Failing);
        registry.register_notification("test/chatty", Chatty);
        MessageProcessor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_ping() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
        assert_eq!(reply, Some(json!({"jsonrpc": "2.0", "id": 1, "result": {}})));
    }

    #[tokio::test]
    async fn test_initialized_notification_has_no_reply() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_batch_is_invalid_request() {
        let reply = run(
            &processor(),
            r#"[{"jsonrpc":"2.0","method":"ping","id":1},{"jsonrpc":"2.0","method":"ping","id":2}]"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(reply["id"], Value::Null);
        assert!(reply.get("result").is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_is_dropped() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"sampling/createMessage","id":4}"#).await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_handler_error_is_internal_error_with_empty_data() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"test/fail","id":"x"}"#)
            .await
            .unwrap();
        assert_eq!(reply["id"], "x");
        assert_eq!(reply["error"]["code"], error_codes::INTERNAL_ERROR);
        assert_eq!(reply["error"]["message"], "Tool execution failed: disk on fire");
        assert_eq!(reply["error"]["data"], json!({}));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_notification_failure_is_logged_not_answered() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"test/chatty"}"#).await;
        assert_eq!(reply, None);
        assert!(logs_contain("Notification handler failed"));
        assert!(logs_contain("listener exploded"));
    }

    #[tokio::test]
    async fn test_bad_version_keeps_extracted_id() {
        let reply = run(&processor(), r#"{"jsonrpc":"1.0","method":"ping","id":12}"#)
            .await
            .unwrap();
        assert_eq!(reply["id"], 12);
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_id_answers_with_null_id() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"ping","id":1.5}"#)
            .await
            .unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_request_method_sent_as_notification_is_not_answered() {
        let reply = run(&processor(), r#"{"jsonrpc":"2.0","method":"ping"}"#).await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_unparseable_is_parse_error() {
        let reply = run(&processor(), "{not json").await.unwrap();
        assert_eq!(reply["error"]["code"], error_codes::PARSE_ERROR);
    }
}
