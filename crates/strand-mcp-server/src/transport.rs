//! Transport contract shared by the stdio and HTTP transports.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use strand_mcp_json_rpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, Message, ValidationError,
};

/// Transport lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl TransportState {
    pub fn can_transition_to(self, next: TransportState) -> bool {
        use TransportState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Starting => "starting",
            TransportState::Running => "running",
            TransportState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{transport} transport received a malformed message: {source}")]
    MalformedMessage {
        transport: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("{transport} transport I/O error: {source}")]
    Io {
        transport: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{transport} transport timed out during {operation} after {after:?}")]
    Timeout {
        transport: &'static str,
        operation: &'static str,
        after: Duration,
    },

    #[error("{transport} transport stream closed")]
    Closed { transport: &'static str },

    #[error("{transport} transport cannot go from {from} to {to}")]
    InvalidState {
        transport: &'static str,
        from: TransportState,
        to: TransportState,
    },

    #[error("{transport} transport is not running")]
    NotRunning { transport: &'static str },

    #[error("{transport} transport does not support {operation}")]
    Unsupported {
        transport: &'static str,
        operation: &'static str,
    },

    #[error("{transport} transport failed: {message}")]
    Other {
        transport: &'static str,
        message: String,
    },
}

impl TransportError {
    pub fn transport(&self) -> &'static str {
        match self {
            TransportError::MalformedMessage { transport, .. }
            | TransportError::Io { transport, .. }
            | TransportError::Timeout { transport, .. }
            | TransportError::Closed { transport }
            | TransportError::InvalidState { transport, .. }
            | TransportError::NotRunning { transport }
            | TransportError::Unsupported { transport, .. }
            | TransportError::Other { transport, .. } => transport,
        }
    }

    /// Wire error object. The transport name stays out of the message.
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            TransportError::MalformedMessage { source, .. } => source.to_error_object(),
            TransportError::Timeout { .. } => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::TransportTimeout, None, None)
            }
            TransportError::Closed { .. } | TransportError::Io { .. } => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::ConnectionClosed, None, None)
            }
            TransportError::InvalidState { .. } | TransportError::NotRunning { .. } => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidState, None, None)
            }
            TransportError::Unsupported { .. } | TransportError::Other { .. } => {
                JsonRpcErrorObject::internal_error("Internal error")
            }
        }
    }

    /// Serialized error response with a `null` id.
    pub fn to_response(&self) -> String {
        Message::from(JsonRpcError::new(None, self.to_error_object())).to_json_string()
    }
}

/// A channel carrying encoded JSON-RPC messages.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Short name used in logs and errors, e.g. `"stdio"`.
    fn transport_name(&self) -> &'static str;

    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    fn is_running(&self) -> bool;

    /// Validate and process one inbound message. Malformed input yields a
    /// parse error response rather than an `Err`.
    async fn handle_message(&self, raw: &str) -> Result<Option<String>, TransportError>;

    /// Push a message to the peer.
    async fn send_message(&self, raw: &str) -> Result<(), TransportError>;
}

/// Lifecycle state guarded for use from `&self`.
#[derive(Debug)]
pub struct StateCell {
    transport: &'static str,
    state: Mutex<TransportState>,
}

impl StateCell {
    pub fn new(transport: &'static str) -> Self {
        Self {
            transport,
            state: Mutex::new(TransportState::Stopped),
        }
    }

    pub fn get(&self) -> TransportState {
        *self.state.lock()
    }

    pub fn transition(&self, next: TransportState) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(TransportError::InvalidState {
                transport: self.transport,
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    pub fn require_running(&self) -> Result<(), TransportError> {
        match self.get() {
            TransportState::Running => Ok(()),
            _ => Err(TransportError::NotRunning {
                transport: self.transport,
            }),
        }
    }
}

/// Log a malformed message with its transport and build the reply.
pub fn malformed_reply(transport: &'static str, source: ValidationError) -> String {
    let error = TransportError::MalformedMessage { transport, source };
    warn!(transport, error = %error, "Rejecting malformed message");
    error.to_response()
}
