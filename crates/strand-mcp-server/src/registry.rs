//! Capability registries: tools, prompts and resources by name or URI.
//!
//! Each registry offers `get`, `get_all` (sorted by name or URI) and
//! `execute`. Unknown names are reported as the matching `*NotFound` error.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use strand_mcp_protocol::{
    CallToolResult, GetPromptResult, McpError, McpResult, Prompt, ReadResourceResult, Resource,
    ResourceTemplate, Tool,
};

use crate::prompt::McpPrompt;
use crate::resource::{McpResource, McpResourceTemplate};
use crate::tool::{McpTool, ToolContext};

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn McpTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register<T: McpTool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn with_tool<T: McpTool + 'static>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn McpTool>> {
        self.tools.get(name).cloned()
    }

    pub fn get_all(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|t| t.descriptor()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn execute(&self, name: &str, args: Value, context: ToolContext) -> McpResult<CallToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        debug!(tool = %name, "Executing tool");
        tool.call(args, context).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Default, Clone)]
pub struct PromptRegistry {
    prompts: HashMap<String, Arc<dyn McpPrompt>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: McpPrompt + 'static>(&mut self, prompt: P) {
        let prompt: Arc<dyn McpPrompt> = Arc::new(prompt);
        self.prompts.insert(prompt.name(), prompt);
    }

    pub fn with_prompt<P: McpPrompt + 'static>(mut self, prompt: P) -> Self {
        self.register(prompt);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn McpPrompt>> {
        self.prompts.get(name).cloned()
    }

    pub fn get_all(&self) -> Vec<Prompt> {
        let mut prompts: Vec<Prompt> = self.prompts.values().map(|p| p.descriptor()).collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    /// Render a prompt after checking its required arguments.
    pub async fn execute(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> McpResult<GetPromptResult> {
        let prompt = self
            .get(name)
            .ok_or_else(|| McpError::PromptNotFound(name.to_string()))?;
        let descriptor = prompt.descriptor();

        for argument in descriptor.arguments.iter().flatten() {
            if argument.is_required() && !arguments.contains_key(&argument.name) {
                return Err(McpError::InvalidParameters(format!(
                    "Missing required argument '{}' for prompt '{}'",
                    argument.name, name
                )));
            }
        }

        debug!(prompt = %name, arguments = arguments.len(), "Rendering prompt");
        let messages = prompt.render(arguments).await?;
        Ok(GetPromptResult {
            description: descriptor.description,
            messages,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

#[derive(Default, Clone)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<dyn McpResource>>,
    templates: Vec<Arc<dyn McpResourceTemplate>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: McpResource + 'static>(&mut self, resource: R) {
        let resource: Arc<dyn McpResource> = Arc::new(resource);
        self.resources.insert(resource.uri(), resource);
    }

    pub fn register_template<T: McpResourceTemplate + 'static>(&mut self, template: T) {
        self.templates.push(Arc::new(template));
    }

    pub fn with_resource<R: McpResource + 'static>(mut self, resource: R) -> Self {
        self.register(resource);
        self
    }

    pub fn with_template<T: McpResourceTemplate + 'static>(mut self, template: T) -> Self {
        self.register_template(template);
        self
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn McpResource>> {
        self.resources.get(uri).cloned()
    }

    pub fn get_all(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.resources.values().map(|r| r.descriptor()).collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        resources
    }

    pub fn get_all_templates(&self) -> Vec<ResourceTemplate> {
        let mut templates: Vec<ResourceTemplate> =
            self.templates.iter().map(|t| t.descriptor()).collect();
        templates.sort_by(|a, b| a.uri_template.cmp(&b.uri_template));
        templates
    }

    /// Read `uri`: an exact resource first, then the first matching template.
    pub async fn execute(&self, uri: &str) -> McpResult<ReadResourceResult> {
        if let Some(resource) = self.get(uri) {
            debug!(uri = %uri, "Reading resource");
            return Ok(ReadResourceResult {
                contents: resource.read().await?,
            });
        }

        let template = self
            .templates
            .iter()
            .find(|t| t.matches(uri))
            .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;
        debug!(uri = %uri, "Reading resource through template");
        Ok(ReadResourceResult {
            contents: template.read(uri).await?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.templates.is_empty()
    }
}
