//! Generic JSON-RPC message envelope.
//!
//! A [`Message`] carries every field any of the four message kinds may
//! have. The kind is derived from which fields are present, never from an
//! explicit tag, so decoding is manual and strict.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{JsonRpcErrorObject, ValidationError};
use crate::types::{JsonRpcVersion, RequestId};

/// Message kind derived from field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
    ErrorResponse,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Notification => "notification",
            MessageKind::Response => "response",
            MessageKind::ErrorResponse => "error response",
        };
        f.write_str(name)
    }
}

/// A single JSON-RPC envelope.
///
/// `result: Some(Value::Null)` means a present `"result": null`, which is a
/// valid success response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub version: JsonRpcVersion,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub id: Option<RequestId>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcErrorObject>,
}

impl Message {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            ..Default::default()
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Error response. `id` is `None` when the request id could not be
    /// determined; it is then serialized as `null`.
    pub fn error(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            id,
            error: Some(error),
            ..Default::default()
        }
    }

    /// Derive the success response for this message, keeping its id.
    pub fn with_result(self, result: Value) -> Self {
        Self {
            version: self.version,
            id: self.id,
            result: Some(result),
            ..Default::default()
        }
    }

    /// Derive the error response for this message, keeping its id.
    pub fn with_error(self, error: JsonRpcErrorObject) -> Self {
        Self {
            version: self.version,
            id: self.id,
            error: Some(error),
            ..Default::default()
        }
    }

    /// Classify the message, rejecting any field combination that is not
    /// one of the four kinds.
    pub fn kind(&self) -> Result<MessageKind, ValidationError> {
        match (&self.method, &self.result, &self.error) {
            (Some(_), None, None) => Ok(if self.id.is_some() {
                MessageKind::Request
            } else {
                MessageKind::Notification
            }),
            (Some(_), _, _) => Err(ValidationError::InvalidShape(
                "a request or notification must not carry result or error",
            )),
            (None, Some(_), Some(_)) => Err(ValidationError::InvalidShape(
                "a response must not carry both result and error",
            )),
            (None, None, None) => Err(ValidationError::InvalidShape(
                "a response must carry either result or error",
            )),
            (None, Some(_), None) if self.id.is_none() => Err(ValidationError::InvalidShape(
                "a success response must carry an id",
            )),
            (None, Some(_), None) => Ok(MessageKind::Response),
            (None, None, Some(_)) => Ok(MessageKind::ErrorResponse),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind().is_ok()
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind(), Ok(MessageKind::Request))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self.kind(), Ok(MessageKind::Notification))
    }

    /// Decode from a JSON value, checking field types but not the shape.
    /// Use [`Message::kind`] to check the shape.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let mut map = match value {
            Value::Object(map) => map,
            Value::Array(_) => return Err(ValidationError::BatchNotSupported),
            _ => return Err(ValidationError::NotAnObject),
        };

        let version = match map.get("jsonrpc") {
            Some(v) => JsonRpcVersion::from_value(v)?,
            None => return Err(ValidationError::InvalidVersion("missing".to_string())),
        };

        let method = match map.remove("method") {
            None => None,
            Some(Value::String(m)) => Some(m),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "method",
                    expected: "a string",
                });
            }
        };

        let params = match map.remove("params") {
            None => None,
            Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "params",
                    expected: "an object or an array",
                });
            }
        };

        let id = match map.get("id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(RequestId::from_value(id)?),
        };

        let error = match map.get("error") {
            None => None,
            Some(e) => Some(JsonRpcErrorObject::from_value(e)?),
        };

        Ok(Self {
            version,
            method,
            params,
            id,
            result: map.remove("result"),
            error,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), Value::from(self.version.as_str()));
        if let Some(method) = &self.method {
            map.insert("method".into(), Value::from(method.as_str()));
        }
        if let Some(params) = &self.params {
            map.insert("params".into(), params.clone());
        }
        match &self.id {
            Some(id) => {
                map.insert("id".into(), id.to_value());
            }
            // responses always carry an id member, null when unknown
            None if self.method.is_none() => {
                map.insert("id".into(), Value::Null);
            }
            None => {}
        }
        if let Some(result) = &self.result {
            map.insert("result".into(), result.clone());
        }
        if let Some(error) = &self.error {
            if let Ok(error) = serde_json::to_value(error) {
                map.insert("error".into(), error);
            }
        }
        Value::Object(map)
    }

    /// Decode and classify in one step.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(text)?;
        let message = Self::from_value(value)?;
        message.kind()?;
        Ok(message)
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(serde::de::Error::custom)
    }
}
