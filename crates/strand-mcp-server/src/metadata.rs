//! Transport metadata: server identity plus the capability registries.
//!
//! [`TransportMetadata`] is built once at startup and handed to the message
//! processor on every call. The HTTP transport persists a
//! [`MetadataSnapshot`] in session metadata and rebuilds a request-scoped
//! instance from it through a [`CapabilityCatalog`]. Only identifying data
//! is snapshotted; registries are looked up again by capability-set id.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use strand_mcp_protocol::{McpError, McpResult};

use crate::cancellation::CancellationRegistry;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};

/// Capability-set id used when none is configured.
pub const DEFAULT_CAPABILITY_SET: &str = "default";

/// The three registries served together under one id.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub resources: Arc<ResourceRegistry>,
}

impl CapabilitySet {
    pub fn new(tools: ToolRegistry, prompts: PromptRegistry, resources: ResourceRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
            prompts: Arc::new(prompts),
            resources: Arc::new(resources),
        }
    }
}

/// Serializable identity of a [`TransportMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub server_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub capability_set: String,
}

#[derive(Clone)]
pub struct TransportMetadata {
    server_name: String,
    version: String,
    instructions: Option<String>,
    capability_set_id: String,
    capabilities: CapabilitySet,
    cancellations: Arc<CancellationRegistry>,
    cancellation_scope: Option<String>,
}

impl TransportMetadata {
    pub fn builder(server_name: impl Into<String>, version: impl Into<String>) -> TransportMetadataBuilder {
        TransportMetadataBuilder::new(server_name, version)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn capability_set_id(&self) -> &str {
        &self.capability_set_id
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.capabilities.tools
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.capabilities.prompts
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.capabilities.resources
    }

    /// Requests in flight that `notifications/cancelled` can reach. Shared
    /// by every metadata restored from the same catalog.
    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    /// Scope `tools/call` registrations and `notifications/cancelled`
    /// lookups are confined to, typically the session id.
    pub fn cancellation_scope(&self) -> Option<&str> {
        self.cancellation_scope.as_deref()
    }

    pub fn with_cancellation_scope(mut self, scope: impl Into<String>) -> Self {
        self.cancellation_scope = Some(scope.into());
        self
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            server_name: self.server_name.clone(),
            version: self.version.clone(),
            instructions: self.instructions.clone(),
            capability_set: self.capability_set_id.clone(),
        }
    }
}

impl std::fmt::Debug for TransportMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportMetadata")
            .field("server_name", &self.server_name)
            .field("version", &self.version)
            .field("capability_set", &self.capability_set_id)
            .field("tools", &self.capabilities.tools.len())
            .finish()
    }
}

pub struct TransportMetadataBuilder {
    server_name: String,
    version: String,
    instructions: Option<String>,
    capability_set_id: String,
    tools: ToolRegistry,
    prompts: PromptRegistry,
    resources: ResourceRegistry,
    cancellations: Option<Arc<CancellationRegistry>>,
}

impl TransportMetadataBuilder {
    pub fn new(server_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            version: version.into(),
            instructions: None,
            capability_set_id: DEFAULT_CAPABILITY_SET.to_string(),
            tools: ToolRegistry::new(),
            prompts: PromptRegistry::new(),
            resources: ResourceRegistry::new(),
            cancellations: None,
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn capability_set(mut self, id: impl Into<String>) -> Self {
        self.capability_set_id = id.into();
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn prompts(mut self, prompts: PromptRegistry) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn resources(mut self, resources: ResourceRegistry) -> Self {
        self.resources = resources;
        self
    }

    pub fn cancellations(mut self, cancellations: Arc<CancellationRegistry>) -> Self {
        self.cancellations = Some(cancellations);
        self
    }

    pub fn build(self) -> TransportMetadata {
        TransportMetadata {
            server_name: self.server_name,
            version: self.version,
            instructions: self.instructions,
            capability_set_id: self.capability_set_id,
            capabilities: CapabilitySet::new(self.tools, self.prompts, self.resources),
            cancellations: self.cancellations.unwrap_or_default(),
            cancellation_scope: None,
        }
    }
}

/// Capability sets by id, used to rebuild metadata from a snapshot.
#[derive(Clone, Default)]
pub struct CapabilityCatalog {
    sets: HashMap<String, CapabilitySet>,
    cancellations: Arc<CancellationRegistry>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog containing the capability set of `metadata`, sharing its
    /// cancellation registry.
    pub fn from_metadata(metadata: &TransportMetadata) -> Self {
        let mut catalog = Self {
            sets: HashMap::new(),
            cancellations: Arc::clone(&metadata.cancellations),
        };
        catalog.register(metadata.capability_set_id.clone(), metadata.capabilities.clone());
        catalog
    }

    pub fn register(&mut self, id: impl Into<String>, set: CapabilitySet) {
        self.sets.insert(id.into(), set);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sets.contains_key(id)
    }

    /// Rebuild metadata from `snapshot`. Fails when the capability set is
    /// not registered in this process.
    pub fn restore(&self, snapshot: &MetadataSnapshot) -> McpResult<TransportMetadata> {
        let capabilities = self.sets.get(&snapshot.capability_set).ok_or_else(|| {
            McpError::ProtocolViolation(format!(
                "unknown capability set '{}'",
                snapshot.capability_set
            ))
        })?;
        Ok(TransportMetadata {
            server_name: snapshot.server_name.clone(),
            version: snapshot.version.clone(),
            instructions: snapshot.instructions.clone(),
            capability_set_id: snapshot.capability_set.clone(),
            capabilities: capabilities.clone(),
            cancellations: Arc::clone(&self.cancellations),
            cancellation_scope: None,
        })
    }
}
