//! Tool capability trait and the call context handed to tools.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use strand_mcp_json_rpc::RequestId;
use strand_mcp_protocol::{CallToolResult, McpResult, Tool};

use crate::cancellation::CancellationHandle;

/// Per-call context: the originating request and its cancellation flag.
#[derive(Debug, Clone)]
pub struct ToolContext {
    request_id: Option<RequestId>,
    cancellation: CancellationHandle,
}

impl ToolContext {
    pub fn new(request_id: RequestId, cancellation: CancellationHandle) -> Self {
        Self {
            request_id: Some(request_id),
            cancellation,
        }
    }

    /// Context for a call that no client can cancel.
    pub fn detached() -> Self {
        Self {
            request_id: None,
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancellation
    }
}

/// An executable tool.
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Descriptor returned by `tools/list`.
    fn descriptor(&self) -> Tool;

    fn name(&self) -> String {
        self.descriptor().name
    }

    /// `args` is the `arguments` object of `tools/call`, or an empty object.
    async fn call(&self, args: Value, context: ToolContext) -> McpResult<CallToolResult>;
}

type ToolFn = dyn Fn(Value, ToolContext) -> BoxFuture<'static, McpResult<CallToolResult>> + Send + Sync;

/// A tool backed by a closure.
///
/// ```ignore
/// let echo = FnTool::new(Tool::new("echo", ToolSchema::object()), |args, _ctx| {
///     Box::pin(async move { Ok(CallToolResult::text(args["text"].to_string())) })
/// });
/// ```
pub struct FnTool {
    descriptor: Tool,
    handler: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(descriptor: Tool, handler: F) -> Self
    where
        F: Fn(Value, ToolContext) -> BoxFuture<'static, McpResult<CallToolResult>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            descriptor,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl McpTool for FnTool {
    fn descriptor(&self) -> Tool {
        self.descriptor.clone()
    }

    fn name(&self) -> String {
        self.descriptor.name.clone()
    }

    async fn call(&self, args: Value, context: ToolContext) -> McpResult<CallToolResult> {
        (self.handler)(args, context).await
    }
}
