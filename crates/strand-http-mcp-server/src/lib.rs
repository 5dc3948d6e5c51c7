//! # Strand HTTP MCP Server
//!
//! HTTP transport for the strand MCP engine. Each request is handled on its
//! own: the session store is the only state shared between requests, and
//! an optional event store makes responses resumable over SSE.
//!
//! ## Usage
//!
//! ```ignore
//! use strand_http_mcp_server::HttpMcpServer;
//!
//! let server = HttpMcpServer::builder(metadata)
//!     .bind_address("127.0.0.1:8000".parse()?)
//!     .session_store(Arc::new(SqliteSessionStore::new().await?))
//!     .build();
//! server.run().await?;
//! ```

pub mod auth;
pub mod prelude;
pub mod protocol;
pub mod response;
pub mod server;
pub mod session;
pub mod transport;

pub use auth::{
    AnonymousAuthenticator, AuthenticationError, Authenticator, BearerTokenAuthenticator,
    Principal,
};
pub use protocol::{
    LAST_EVENT_ID, MCP_EVENT_ID, MCP_SESSION_ID, X_MCP_SESSION_ID, extract_last_event_id,
    extract_session_id, is_initialize_request,
};
pub use server::{HttpMcpServer, HttpMcpServerBuilder, ServerConfig};
pub use session::SessionMetadata;
pub use transport::HttpTransport;

use strand_mcp_protocol::McpError;
use strand_mcp_server::TransportError;
use strand_mcp_session_storage::{EventStoreError, SessionStorageError};

/// Result type for HTTP MCP server operations
pub type Result<T> = std::result::Result<T, HttpMcpError>;

/// HTTP MCP server errors
#[derive(Debug, thiserror::Error)]
pub enum HttpMcpError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Session storage error: {0}")]
    Storage(#[from] SessionStorageError),

    #[error("Event store error: {0}")]
    Events(#[from] EventStoreError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
