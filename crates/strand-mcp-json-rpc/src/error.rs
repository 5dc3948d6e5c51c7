use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error_codes;
use crate::message::MessageKind;

/// Which partition of the code space an error code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Standard,
    Mcp,
    Auth,
    Http,
    StreamResumption,
    Connection,
    Other,
}

/// JSON-RPC error codes, including the MCP and transport ranges.
///
/// Codes are the stable contract; [`JsonRpcErrorCode::message`] is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ProtocolViolation,
    ToolNotFound,
    ResourceNotFound,
    PromptNotFound,
    UnsupportedProtocolVersion,
    InvalidState,
    AuthenticationFailed,
    AuthorizationDenied,
    InvalidSession,
    SessionExpired,
    UnknownEventId,
    StreamExpired,
    ConnectionClosed,
    TransportTimeout,
    MalformedMessage,
    Other(i64),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        use error_codes::*;
        match self {
            JsonRpcErrorCode::ParseError => PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => METHOD_NOT_FOUND,
            JsonRpcErrorCode::InvalidParams => INVALID_PARAMS,
            JsonRpcErrorCode::InternalError => INTERNAL_ERROR,
            JsonRpcErrorCode::ProtocolViolation => PROTOCOL_VIOLATION,
            JsonRpcErrorCode::ToolNotFound => TOOL_NOT_FOUND,
            JsonRpcErrorCode::ResourceNotFound => RESOURCE_NOT_FOUND,
            JsonRpcErrorCode::PromptNotFound => PROMPT_NOT_FOUND,
            JsonRpcErrorCode::UnsupportedProtocolVersion => UNSUPPORTED_PROTOCOL_VERSION,
            JsonRpcErrorCode::InvalidState => INVALID_STATE,
            JsonRpcErrorCode::AuthenticationFailed => AUTHENTICATION_FAILED,
            JsonRpcErrorCode::AuthorizationDenied => AUTHORIZATION_DENIED,
            JsonRpcErrorCode::InvalidSession => INVALID_SESSION,
            JsonRpcErrorCode::SessionExpired => SESSION_EXPIRED,
            JsonRpcErrorCode::UnknownEventId => UNKNOWN_EVENT_ID,
            JsonRpcErrorCode::StreamExpired => STREAM_EXPIRED,
            JsonRpcErrorCode::ConnectionClosed => CONNECTION_CLOSED,
            JsonRpcErrorCode::TransportTimeout => TRANSPORT_TIMEOUT,
            JsonRpcErrorCode::MalformedMessage => MALFORMED_MESSAGE,
            JsonRpcErrorCode::Other(code) => *code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        use error_codes::*;
        match code {
            PARSE_ERROR => JsonRpcErrorCode::ParseError,
            INVALID_REQUEST => JsonRpcErrorCode::InvalidRequest,
            METHOD_NOT_FOUND => JsonRpcErrorCode::MethodNotFound,
            INVALID_PARAMS => JsonRpcErrorCode::InvalidParams,
            INTERNAL_ERROR => JsonRpcErrorCode::InternalError,
            PROTOCOL_VIOLATION => JsonRpcErrorCode::ProtocolViolation,
            TOOL_NOT_FOUND => JsonRpcErrorCode::ToolNotFound,
            RESOURCE_NOT_FOUND => JsonRpcErrorCode::ResourceNotFound,
            PROMPT_NOT_FOUND => JsonRpcErrorCode::PromptNotFound,
            UNSUPPORTED_PROTOCOL_VERSION => JsonRpcErrorCode::UnsupportedProtocolVersion,
            INVALID_STATE => JsonRpcErrorCode::InvalidState,
            AUTHENTICATION_FAILED => JsonRpcErrorCode::AuthenticationFailed,
            AUTHORIZATION_DENIED => JsonRpcErrorCode::AuthorizationDenied,
            INVALID_SESSION => JsonRpcErrorCode::InvalidSession,
            SESSION_EXPIRED => JsonRpcErrorCode::SessionExpired,
            UNKNOWN_EVENT_ID => JsonRpcErrorCode::UnknownEventId,
            STREAM_EXPIRED => JsonRpcErrorCode::StreamExpired,
            CONNECTION_CLOSED => JsonRpcErrorCode::ConnectionClosed,
            TRANSPORT_TIMEOUT => JsonRpcErrorCode::TransportTimeout,
            MALFORMED_MESSAGE => JsonRpcErrorCode::MalformedMessage,
            other => JsonRpcErrorCode::Other(other),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::ProtocolViolation => "Protocol violation",
            JsonRpcErrorCode::ToolNotFound => "Tool not found",
            JsonRpcErrorCode::ResourceNotFound => "Resource not found",
            JsonRpcErrorCode::PromptNotFound => "Prompt not found",
            JsonRpcErrorCode::UnsupportedProtocolVersion => "Unsupported protocol version",
            JsonRpcErrorCode::InvalidState => "Invalid state",
            JsonRpcErrorCode::AuthenticationFailed => "Authentication failed",
            JsonRpcErrorCode::AuthorizationDenied => "Authorization denied",
            JsonRpcErrorCode::InvalidSession => "Invalid or missing session",
            JsonRpcErrorCode::SessionExpired => "Session expired",
            JsonRpcErrorCode::UnknownEventId => "Unknown event id",
            JsonRpcErrorCode::StreamExpired => "Stream expired",
            JsonRpcErrorCode::ConnectionClosed => "Connection closed",
            JsonRpcErrorCode::TransportTimeout => "Transport timeout",
            JsonRpcErrorCode::MalformedMessage => "Malformed message",
            JsonRpcErrorCode::Other(_) => "Server error",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            -32768..=-32100 => ErrorCategory::Standard,
            -32019..=-32000 => ErrorCategory::Mcp,
            -32039..=-32030 => ErrorCategory::Auth,
            -32049..=-32040 => ErrorCategory::Http,
            -32059..=-32050 => ErrorCategory::StreamResumption,
            -32069..=-32060 => ErrorCategory::Connection,
            _ => ErrorCategory::Other,
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, None, data)
    }

    pub fn invalid_request(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, message, None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            Some(format!("Method '{}' not found", method)),
            None,
        )
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::InvalidParams,
            Some(message.to_string()),
            None,
        )
    }

    /// Internal error carrying an empty structured `data` payload.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            JsonRpcErrorCode::InternalError,
            Some(message.into()),
            Some(Value::Object(Default::default())),
        )
    }

    pub fn error_code(&self) -> JsonRpcErrorCode {
        JsonRpcErrorCode::from_code(self.code)
    }

    pub(crate) fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value.as_object().ok_or(ValidationError::InvalidField {
            field: "error",
            expected: "an object",
        })?;
        let code = map
            .get("code")
            .and_then(Value::as_i64)
            .ok_or(ValidationError::InvalidField {
                field: "error.code",
                expected: "an integer",
            })?;
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .ok_or(ValidationError::InvalidField {
                field: "error.message",
                expected: "a string",
            })?;
        Ok(Self {
            code,
            message: message.to_string(),
            data: map.get("data").cloned(),
        })
    }
}

impl fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.code, self.message)
    }
}

/// Malformed, missing or mistyped wire content.
///
/// Raised by the validator and by the message decoder. It is converted to a
/// wire error before leaving the engine.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("empty message")]
    Empty,

    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message contains an embedded line terminator")]
    EmbeddedLineTerminator,

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("message must be a JSON object")]
    NotAnObject,

    #[error("batch requests are not supported")]
    BatchNotSupported,

    #[error("invalid jsonrpc version: {0}")]
    InvalidVersion(String),

    #[error("invalid id {0}: must be a string or an integer")]
    InvalidId(String),

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid message shape: {0}")]
    InvalidShape(&'static str),

    #[error("expected a {expected} but found a {found}")]
    UnexpectedKind {
        expected: MessageKind,
        found: MessageKind,
    },
}

impl ValidationError {
    /// Wire error object for this failure. Format failures are parse errors,
    /// everything else is an invalid request.
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            ValidationError::Empty
            | ValidationError::InvalidUtf8(_)
            | ValidationError::InvalidJson(_)
            | ValidationError::EmbeddedLineTerminator
            | ValidationError::TooLarge { .. } => JsonRpcErrorObject::parse_error(None),
            other => JsonRpcErrorObject::invalid_request(Some(other.to_string())),
        }
    }
}
