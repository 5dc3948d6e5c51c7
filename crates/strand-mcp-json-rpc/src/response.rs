use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JsonRpcErrorObject, ValidationError};
use crate::message::{Message, MessageKind};
use crate::types::{JsonRpcVersion, RequestId};

/// A successful JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result,
        }
    }
}

/// A JSON-RPC error response. `id` is `None` (serialized `null`) when the
/// failing request's id could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            error,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorObject::parse_error(None))
    }

    pub fn invalid_request(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::invalid_request(message))
    }

    pub fn internal_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::internal_error(message))
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for JsonRpcError {}

impl TryFrom<Message> for JsonRpcResponse {
    type Error = ValidationError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message.kind()? {
            MessageKind::Response => {}
            found => {
                return Err(ValidationError::UnexpectedKind {
                    expected: MessageKind::Response,
                    found,
                });
            }
        }
        match (message.id, message.result) {
            (Some(id), Some(result)) => Ok(Self {
                version: message.version,
                id,
                result,
            }),
            _ => Err(ValidationError::InvalidShape("a response needs an id and a result")),
        }
    }
}

impl TryFrom<Message> for JsonRpcError {
    type Error = ValidationError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message.kind()? {
            MessageKind::ErrorResponse => {}
            found => {
                return Err(ValidationError::UnexpectedKind {
                    expected: MessageKind::ErrorResponse,
                    found,
                });
            }
        }
        let error = message
            .error
            .ok_or(ValidationError::InvalidShape("an error response needs an error"))?;
        Ok(Self {
            version: message.version,
            id: message.id,
            error,
        })
    }
}

impl From<JsonRpcResponse> for Message {
    fn from(response: JsonRpcResponse) -> Self {
        Message {
            version: response.version,
            id: Some(response.id),
            result: Some(response.result),
            ..Default::default()
        }
    }
}

impl From<JsonRpcError> for Message {
    fn from(error: JsonRpcError) -> Self {
        Message {
            version: error.version,
            id: error.id,
            error: Some(error.error),
            ..Default::default()
        }
    }
}

/// Outbound reply to a request: a success or an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Response(response) => Some(&response.id),
            JsonRpcMessage::Error(error) => error.id.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcMessage::Error(_))
    }

    pub fn to_json_string(&self) -> String {
        Message::from(self.clone()).to_json_string()
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(error: JsonRpcError) -> Self {
        JsonRpcMessage::Error(error)
    }
}

impl From<JsonRpcMessage> for Message {
    fn from(message: JsonRpcMessage) -> Self {
        match message {
            JsonRpcMessage::Response(response) => response.into(),
            JsonRpcMessage::Error(error) => error.into(),
        }
    }
}
