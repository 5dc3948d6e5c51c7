//! # Strand MCP Server
//!
//! The protocol engine: capability registries, the handler registry and
//! per-method handlers, the message processor, the transport contract and
//! the stdio transport. The HTTP transport lives in
//! `strand-http-mcp-server`.
//!
//! ```ignore
//! let metadata = TransportMetadata::builder("my-server", "1.0.0")
//!     .tools(ToolRegistry::new().with_tool(my_tool))
//!     .build();
//! let transport = StdioTransport::new(CurrentProcess::default(), MessageProcessor::standard(), metadata);
//! transport.run().await?;
//! ```

pub mod cancellation;
pub mod handlers;
pub mod metadata;
pub mod prelude;
pub mod processor;
pub mod prompt;
pub mod registry;
pub mod resource;
pub mod stdio;
pub mod tool;
pub mod transport;

pub use cancellation::{CancellationGuard, CancellationHandle, CancellationRegistry};
pub use handlers::{
    Handler, HandlerRegistry, NotificationHandler, RequestHandler, DEFAULT_PAGE_SIZE,
};
pub use metadata::{
    CapabilityCatalog, CapabilitySet, MetadataSnapshot, TransportMetadata,
    TransportMetadataBuilder, DEFAULT_CAPABILITY_SET,
};
pub use processor::MessageProcessor;
pub use prompt::McpPrompt;
pub use registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
pub use resource::{McpResource, McpResourceTemplate, TextResource};
pub use stdio::{CurrentProcess, ProcessHandle, StdioConfig, StdioPipes, StdioTransport};
pub use tool::{FnTool, McpTool, ToolContext};
pub use transport::{McpTransport, StateCell, TransportError, TransportState, malformed_reply};

pub use strand_mcp_json_rpc as json_rpc;
pub use strand_mcp_protocol as protocol;
pub use strand_mcp_protocol::{McpError, McpResult};
