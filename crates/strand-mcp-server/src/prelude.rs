//! Everything needed to define capabilities and serve them.

pub use crate::{
    CancellationHandle, CapabilityCatalog, CurrentProcess, FnTool, HandlerRegistry, McpPrompt,
    McpResource, McpResourceTemplate, McpTool, McpTransport, MessageProcessor, PromptRegistry,
    ResourceRegistry, StdioConfig, StdioTransport, TextResource, ToolContext, ToolRegistry,
    TransportError, TransportMetadata,
};
pub use strand_mcp_protocol::prelude::*;
