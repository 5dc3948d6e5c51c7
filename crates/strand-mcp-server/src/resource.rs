//! Resource and resource template capability traits.

use async_trait::async_trait;

use strand_mcp_protocol::{McpResult, Resource, ResourceContents, ResourceTemplate};

/// A readable resource with a fixed URI.
#[async_trait]
pub trait McpResource: Send + Sync {
    /// Descriptor returned by `resources/list`.
    fn descriptor(&self) -> Resource;

    fn uri(&self) -> String {
        self.descriptor().uri
    }

    async fn read(&self) -> McpResult<Vec<ResourceContents>>;
}

/// A family of resources addressed by an RFC 6570 style URI template.
#[async_trait]
pub trait McpResourceTemplate: Send + Sync {
    /// Descriptor returned by `resources/templates/list`.
    fn descriptor(&self) -> ResourceTemplate;

    /// Whether `uri` belongs to this template. The default accepts any URI
    /// that extends the literal prefix before the first `{`.
    fn matches(&self, uri: &str) -> bool {
        let template = self.descriptor().uri_template;
        match template.find('{') {
            Some(split) => uri.len() > split && uri.starts_with(&template[..split]),
            None => uri == template,
        }
    }

    async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContents>>;
}

/// In-memory text resource.
#[derive(Debug, Clone)]
pub struct TextResource {
    descriptor: Resource,
    text: String,
}

impl TextResource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            descriptor: Resource::new(uri, name).with_mime_type("text/plain"),
            text: text.into(),
        }
    }
}

#[async_trait]
impl McpResource for TextResource {
    fn descriptor(&self) -> Resource {
        self.descriptor.clone()
    }

    fn uri(&self) -> String {
        self.descriptor.uri.clone()
    }

    async fn read(&self) -> McpResult<Vec<ResourceContents>> {
        Ok(vec![ResourceContents::text(&self.descriptor.uri, &self.text)])
    }
}
