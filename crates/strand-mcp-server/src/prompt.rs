//! Prompt capability trait.

use std::collections::HashMap;

use async_trait::async_trait;

use strand_mcp_protocol::{McpResult, Prompt, PromptMessage};

/// A prompt template rendered into messages.
#[async_trait]
pub trait McpPrompt: Send + Sync {
    /// Descriptor returned by `prompts/list`.
    fn descriptor(&self) -> Prompt;

    fn name(&self) -> String {
        self.descriptor().name
    }

    /// Required arguments are checked by the registry before this is called.
    async fn render(&self, arguments: HashMap<String, String>) -> McpResult<Vec<PromptMessage>>;
}
