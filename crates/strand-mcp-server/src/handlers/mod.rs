//! MCP Handler System
//!
//! One small handler per protocol method, registered by method name in a
//! [`HandlerRegistry`]. Request handlers produce a result value; notification
//! handlers produce nothing. Handlers only translate between JSON-RPC
//! messages and the capability registries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use strand_mcp_json_rpc::{JsonRpcNotification, JsonRpcRequest, Message, ValidationError};
use strand_mcp_protocol::{Cursor, McpError, McpResult, methods};

use crate::metadata::TransportMetadata;

pub mod initialize;
pub mod notifications;
pub mod ping;
pub mod prompts;
pub mod resources;
pub mod tools;

pub use initialize::InitializeHandler;
pub use notifications::{CancelledHandler, InitializedHandler, ProgressHandler};
pub use ping::PingHandler;
pub use prompts::{PromptsGetHandler, PromptsListHandler};
pub use resources::{ResourceTemplatesListHandler, ResourcesListHandler, ResourcesReadHandler};
pub use tools::{ToolsCallHandler, ToolsListHandler};

/// MCP suggested default page size for `*/list` results.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Handler for a method that expects exactly one response.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Build the typed request. Fails when the message is not a request.
    fn build(&self, message: Message) -> Result<JsonRpcRequest, ValidationError> {
        JsonRpcRequest::try_from(message)
    }

    async fn invoke(&self, request: JsonRpcRequest, metadata: &TransportMetadata) -> McpResult<Value>;
}

/// Handler for a fire-and-forget notification. Never answered.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    fn build(&self, message: Message) -> Result<JsonRpcNotification, ValidationError> {
        JsonRpcNotification::try_from(message)
    }

    async fn invoke(&self, _notification: JsonRpcNotification, _metadata: &TransportMetadata) -> McpResult<()> {
        Ok(())
    }
}

/// A registered handler.
#[derive(Clone)]
pub enum Handler {
    Request(Arc<dyn RequestHandler>),
    Notification(Arc<dyn NotificationHandler>),
}

/// Method name to handler table. Built once and shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every method the engine serves out of the box.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_request(methods::INITIALIZE, InitializeHandler);
        registry.register_request(methods::PING, PingHandler);
        registry.register_request(methods::TOOLS_LIST, ToolsListHandler);
        registry.register_request(methods::TOOLS_CALL, ToolsCallHandler);
        registry.register_request(methods::PROMPTS_LIST, PromptsListHandler);
        registry.register_request(methods::PROMPTS_GET, PromptsGetHandler);
        registry.register_request(methods::RESOURCES_LIST, ResourcesListHandler);
        registry.register_request(methods::RESOURCES_READ, ResourcesReadHandler);
        registry.register_request(methods::RESOURCES_TEMPLATES_LIST, ResourceTemplatesListHandler);
        registry.register_notification(methods::NOTIFICATION_INITIALIZED, InitializedHandler);
        registry.register_notification(methods::NOTIFICATION_PROGRESS, ProgressHandler);
        registry.register_notification(methods::NOTIFICATION_CANCELLED, CancelledHandler);
        registry
    }

    /// Register or replace the handler for `method`.
    pub fn register_request<H: RequestHandler + 'static>(&mut self, method: impl Into<String>, handler: H) {
        self.handlers
            .insert(method.into(), Handler::Request(Arc::new(handler)));
    }

    pub fn register_notification<H: NotificationHandler + 'static>(
        &mut self,
        method: impl Into<String>,
        handler: H,
    ) {
        self.handlers
            .insert(method.into(), Handler::Notification(Arc::new(handler)));
    }

    pub fn get(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

/// Decode `params` into `T`. Absent params decode from an empty object so
/// that all-optional parameter types need no params at all.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| McpError::InvalidParameters(e.to_string()))
}

/// One page of `items`, which must already be sorted by `key`.
///
/// The page starts after the first item whose key is greater than the
/// cursor; the next cursor is the key of the last item on the page and is
/// only present when more items follow.
pub(crate) fn paginate<T>(
    items: Vec<T>,
    cursor: Option<&Cursor>,
    key: impl Fn(&T) -> &str,
) -> (Vec<T>, Option<Cursor>) {
    let total = items.len();
    let start = match cursor {
        Some(cursor) => items
            .iter()
            .position(|item| key(item) > cursor.as_str())
            .unwrap_or(total),
        None => 0,
    };
    let end = (start + DEFAULT_PAGE_SIZE).min(total);
    let has_more = end < total;

    let page: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    let next_cursor = if has_more {
        page.last().map(|item| Cursor::new(key(item)))
    } else {
        None
    };

    tracing::debug!(
        start,
        end,
        page_size = page.len(),
        has_more,
        next_cursor = ?next_cursor,
        "Pagination"
    );
    (page, next_cursor)
}
