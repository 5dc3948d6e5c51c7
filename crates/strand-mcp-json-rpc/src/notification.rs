use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::message::{Message, MessageKind};
use crate::types::JsonRpcVersion;

/// A JSON-RPC notification (request without an id). Never answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params,
        }
    }

    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.as_object()?.get(name)
    }
}

impl TryFrom<Message> for JsonRpcNotification {
    type Error = ValidationError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message.kind()? {
            MessageKind::Notification => {}
            found => {
                return Err(ValidationError::UnexpectedKind {
                    expected: MessageKind::Notification,
                    found,
                });
            }
        }
        let method = message
            .method
            .ok_or(ValidationError::InvalidShape("a notification needs a method"))?;
        Ok(Self {
            version: message.version,
            method,
            params: message.params,
        })
    }
}

impl From<JsonRpcNotification> for Message {
    fn from(notification: JsonRpcNotification) -> Self {
        Message {
            version: notification.version,
            method: Some(notification.method),
            params: notification.params,
            ..Default::default()
        }
    }
}
