//! # JSON-RPC 2.0 for MCP
//!
//! Transport-agnostic JSON-RPC 2.0 building blocks used by the MCP engine:
//! the generic [`Message`] envelope and its typed views, the error object
//! and code taxonomy, and the pre-parse [`MessageValidator`].
//!
//! Nothing in this crate performs I/O.

pub mod error;
pub mod message;
pub mod notification;
pub mod prelude;
pub mod request;
pub mod response;
pub mod types;
pub mod validator;

pub use error::{ErrorCategory, JsonRpcErrorCode, JsonRpcErrorObject, ValidationError};
pub use message::{Message, MessageKind};
pub use notification::JsonRpcNotification;
pub use request::JsonRpcRequest;
pub use response::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId};
pub use validator::{MessageValidator, Strictness, ValidatorConfig};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes. Standard JSON-RPC codes first, then the MCP range
/// (-32000..=-32019) and the transport ranges.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // MCP
    pub const PROTOCOL_VIOLATION: i64 = -32000;
    pub const TOOL_NOT_FOUND: i64 = -32001;
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
    pub const PROMPT_NOT_FOUND: i64 = -32003;
    pub const UNSUPPORTED_PROTOCOL_VERSION: i64 = -32004;
    pub const INVALID_STATE: i64 = -32005;

    // Authentication
    pub const AUTHENTICATION_FAILED: i64 = -32030;
    pub const AUTHORIZATION_DENIED: i64 = -32031;

    // HTTP
    pub const INVALID_SESSION: i64 = -32040;
    pub const SESSION_EXPIRED: i64 = -32041;

    // Stream resumption
    pub const UNKNOWN_EVENT_ID: i64 = -32050;
    pub const STREAM_EXPIRED: i64 = -32051;

    // Connection
    pub const CONNECTION_CLOSED: i64 = -32060;
    pub const TRANSPORT_TIMEOUT: i64 = -32061;
    pub const MALFORMED_MESSAGE: i64 = -32062;
}
