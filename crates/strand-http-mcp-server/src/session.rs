//! What the HTTP transport keeps in a session's metadata blob.

use serde::{Deserialize, Serialize};

use strand_mcp_server::MetadataSnapshot;

use crate::auth::Principal;

/// Written once on `initialize` and read back on every later request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<MetadataSnapshot>,
}

impl SessionMetadata {
    pub fn new(principal: Principal, transport: MetadataSnapshot) -> Self {
        Self {
            principal: Some(principal),
            transport: Some(transport),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Sessions created by other tools may carry no metadata at all.
    pub fn from_json(raw: Option<&str>) -> serde_json::Result<Self> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw),
            _ => Ok(Self::default()),
        }
    }
}
