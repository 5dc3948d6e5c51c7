//! Common imports for hosting the HTTP transport.

pub use crate::auth::{AnonymousAuthenticator, AuthenticationError, Authenticator, Principal};
pub use crate::server::{HttpMcpServer, HttpMcpServerBuilder, ServerConfig};
pub use crate::transport::HttpTransport;
pub use crate::{HttpMcpError, Result};
