//! Commonly used MCP protocol types.

pub use crate::content::{ContentBlock, ResourceContents};
pub use crate::initialize::{Implementation, InitializeResult, ServerCapabilities};
pub use crate::meta::Cursor;
pub use crate::prompts::{Prompt, PromptArgument, PromptMessage, Role};
pub use crate::resources::{Resource, ResourceTemplate};
pub use crate::tools::{CallToolResult, Tool, ToolSchema};
pub use crate::version::McpVersion;
pub use crate::{McpError, McpResult};
