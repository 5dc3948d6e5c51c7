//! Authentication boundary.
//!
//! Called once on `initialize` to obtain a [`Principal`], which is stored
//! in session metadata and may be re-checked on every later request.

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    /// No acceptable credentials.
    #[error("Authentication failed: {0}")]
    Failed(String),

    /// Credentials were valid but no longer grant access.
    #[error("Access denied: {0}")]
    Denied(String),
}

/// Authenticated identity. Opaque to the transport beyond being stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            attributes: Map::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a client starting a session with this server.
    async fn authenticate(
        &self,
        server_name: &str,
        version: &str,
        headers: &HeaderMap,
    ) -> Result<Principal, AuthenticationError>;

    /// Re-validate a stored principal on a later request.
    async fn check(&self, _principal: &Principal) -> Result<(), AuthenticationError> {
        Ok(())
    }
}

/// Accepts everyone as [`Principal::anonymous`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(
        &self,
        _server_name: &str,
        _version: &str,
        _headers: &HeaderMap,
    ) -> Result<Principal, AuthenticationError> {
        Ok(Principal::anonymous())
    }
}

/// Static bearer-token authentication: `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthenticator {
    tokens: Vec<(String, Principal)>,
}

impl BearerTokenAuthenticator {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.push((token.into(), principal));
        self
    }

    /// Drop a token; sessions opened with it fail their next check.
    pub fn revoke(&mut self, subject: &str) {
        self.tokens.retain(|(_, p)| p.subject != subject);
    }
}

impl Default for BearerTokenAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(
        &self,
        _server_name: &str,
        _version: &str,
        headers: &HeaderMap,
    ) -> Result<Principal, AuthenticationError> {
        let token = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AuthenticationError::Failed("missing bearer token".to_string()))?;

        self.tokens
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| AuthenticationError::Failed("unknown bearer token".to_string()))
    }

    async fn check(&self, principal: &Principal) -> Result<(), AuthenticationError> {
        if self.tokens.iter().any(|(_, p)| p.subject == principal.subject) {
            Ok(())
        } else {
            Err(AuthenticationError::Denied(format!(
                "'{}' is no longer authorized",
                principal.subject
            )))
        }
    }
}
