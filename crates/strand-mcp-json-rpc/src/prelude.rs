//! Commonly used JSON-RPC types.

pub use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject, ValidationError};
pub use crate::message::{Message, MessageKind};
pub use crate::notification::JsonRpcNotification;
pub use crate::request::JsonRpcRequest;
pub use crate::response::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
pub use crate::types::{JsonRpcVersion, RequestId};
pub use crate::validator::{MessageValidator, Strictness};
