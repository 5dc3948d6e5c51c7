use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::message::{Message, MessageKind};
use crate::types::{JsonRpcVersion, RequestId};

/// A JSON-RPC request: method plus id, expects exactly one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            method: method.into(),
            params,
        }
    }

    /// Named parameter lookup; `None` for positional or absent params.
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.as_object()?.get(name)
    }
}

impl TryFrom<Message> for JsonRpcRequest {
    type Error = ValidationError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message.kind()? {
            MessageKind::Request => {}
            found => {
                return Err(ValidationError::UnexpectedKind {
                    expected: MessageKind::Request,
                    found,
                });
            }
        }
        match (message.id, message.method) {
            (Some(id), Some(method)) => Ok(Self {
                version: message.version,
                id,
                method,
                params: message.params,
            }),
            _ => Err(ValidationError::InvalidShape("a request needs an id and a method")),
        }
    }
}

impl From<JsonRpcRequest> for Message {
    fn from(request: JsonRpcRequest) -> Self {
        Message {
            version: request.version,
            method: Some(request.method),
            params: request.params,
            id: Some(request.id),
            ..Default::default()
        }
    }
}
