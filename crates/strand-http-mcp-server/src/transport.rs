//! Per-request HTTP transport.
//!
//! `POST` carries one JSON-RPC message. `initialize` authenticates the
//! client, opens a session and answers with its id in `Mcp-Session-Id`;
//! every other message must name a live session. `DELETE` ends a session.
//! With an event store attached, replies are also appended to the session's
//! stream and `GET` replays that stream as Server-Sent Events.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Limited, LengthLimitError};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use strand_mcp_json_rpc::{
    JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcMessage, Message, MessageValidator, RequestId,
    Strictness,
};
use strand_mcp_server::{
    CapabilityCatalog, McpTransport, MessageProcessor, StateCell, TransportError,
    TransportMetadata, TransportState, malformed_reply,
};
use strand_mcp_session_storage::{BoxedEventStore, BoxedSessionStore, EventId, StoredEvent};

use crate::auth::{AnonymousAuthenticator, AuthenticationError, Authenticator, Principal};
use crate::protocol::{
    MCP_EVENT_ID, MCP_SESSION_ID, extract_last_event_id, extract_session_id,
    is_initialize_request,
};
use crate::response::{self, HttpResponse};
use crate::session::SessionMetadata;
use crate::{HttpMcpError, Result};

const TRANSPORT: &str = "http";

/// 1 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

pub struct HttpTransport {
    processor: MessageProcessor,
    metadata: TransportMetadata,
    catalog: CapabilityCatalog,
    sessions: BoxedSessionStore,
    events: Option<BoxedEventStore>,
    authenticator: Arc<dyn Authenticator>,
    validator: MessageValidator,
    max_body_size: usize,
    state: StateCell,
}

impl HttpTransport {
    /// Transport with anonymous authentication, no event store and a
    /// catalog holding only `metadata`'s capability set.
    pub fn new(
        processor: MessageProcessor,
        metadata: TransportMetadata,
        sessions: BoxedSessionStore,
    ) -> Self {
        let catalog = CapabilityCatalog::from_metadata(&metadata);
        Self {
            processor,
            metadata,
            catalog,
            sessions,
            events: None,
            authenticator: Arc::new(AnonymousAuthenticator),
            validator: MessageValidator::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            state: StateCell::new(TRANSPORT),
        }
    }

    pub fn with_event_store(mut self, events: BoxedEventStore) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Replaces the default catalog. Sessions created by other processes
    /// may name any set registered here.
    pub fn with_catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn metadata(&self) -> &TransportMetadata {
        &self.metadata
    }

    pub fn sessions(&self) -> &BoxedSessionStore {
        &self.sessions
    }

    pub fn events(&self) -> Option<&BoxedEventStore> {
        self.events.as_ref()
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    /// Handle one HTTP request. Never fails: unexpected errors are logged
    /// and answered with a generic 500.
    pub async fn handle_request<B>(&self, request: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(HttpMcpError::InvalidRequest(message)) => {
                debug!(error = %message, "Rejecting HTTP request");
                response::jsonrpc_error(
                    StatusCode::BAD_REQUEST,
                    None,
                    JsonRpcErrorObject::invalid_request(Some(message)),
                )
            }
            Err(e) => {
                error!(error = %e, "HTTP request failed");
                response::internal_error()
            }
        }
    }

    async fn dispatch<B>(&self, request: Request<B>) -> Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let session_id = extract_session_id(request.headers());
        debug!(method = %request.method(), session_id = ?session_id, "HTTP request");

        match request.method() {
            &Method::POST => {}
            &Method::DELETE => return self.handle_delete(session_id).await,
            &Method::GET if self.events.is_some() => {
                return self.handle_replay(session_id, request.headers()).await;
            }
            _ => return Ok(response::method_not_allowed(&self.allowed_methods())),
        }

        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(limit = self.max_body_size, "Request body too large");
                return Ok(response::payload_too_large(self.max_body_size));
            }
            Err(e) => {
                return Err(HttpMcpError::InvalidRequest(format!(
                    "failed to read request body: {}",
                    e
                )));
            }
        };

        if let Err(e) = self.validator.validate(&body, Strictness::Lenient) {
            return Ok(response::json_body(malformed_reply(TRANSPORT, e)));
        }
        let value: Value = serde_json::from_slice(&body)?;

        if is_initialize_request(&value) {
            self.handle_initialize(value, &parts.headers).await
        } else {
            self.handle_session_message(value, session_id).await
        }
    }

    fn allowed_methods(&self) -> Vec<Method> {
        if self.events.is_some() {
            vec![Method::POST, Method::GET, Method::DELETE]
        } else {
            vec![Method::POST, Method::DELETE]
        }
    }

    async fn handle_initialize(&self, value: Value, headers: &HeaderMap) -> Result<HttpResponse> {
        let id = request_id_of(&value);

        let principal = match self
            .authenticator
            .authenticate(self.metadata.server_name(), self.metadata.version(), headers)
            .await
        {
            Ok(principal) => principal,
            Err(e) => return Ok(auth_rejection(id, e)),
        };

        let session_id = self.sessions.create().await?;
        if let Err(e) = self.store_session_metadata(&session_id, principal).await {
            if let Err(cleanup) = self.sessions.terminate(&session_id).await {
                warn!(session_id = %session_id, error = %cleanup, "Could not discard session");
            }
            return Err(e);
        }

        let reply = match self.processor.process_value(value, &self.metadata).await {
            Some(reply) if !reply.is_error() => reply,
            failed => {
                // Nothing to resume; the client never learns this id.
                self.sessions.terminate(&session_id).await?;
                debug!(session_id = %session_id, "Initialize failed, session discarded");
                return Ok(match failed {
                    Some(reply) => response::json_rpc(&reply, &[]),
                    None => response::accepted(&[]),
                });
            }
        };

        info!(session_id = %session_id, "Created MCP session");
        let mut headers = vec![(MCP_SESSION_ID, session_id.clone())];
        if let Some(event_id) = self.record(&session_id, &reply).await? {
            headers.push((MCP_EVENT_ID, event_id.to_string()));
        }
        Ok(response::json_rpc(&reply, &headers))
    }

    async fn store_session_metadata(&self, session_id: &str, principal: Principal) -> Result<()> {
        let stored = SessionMetadata::new(principal, self.metadata.snapshot());
        self.sessions.set_metadata(session_id, stored.to_json()?).await?;
        Ok(())
    }

    async fn handle_session_message(
        &self,
        value: Value,
        session_id: Option<String>,
    ) -> Result<HttpResponse> {
        let id = request_id_of(&value);

        let Some(session_id) = session_id else {
            return Ok(response::session_error(
                id,
                "Missing Mcp-Session-Id header; send initialize first",
            ));
        };
        if !self.sessions.touch(&session_id).await? {
            debug!(session_id = %session_id, "Unknown or expired session");
            return Ok(response::session_error(
                id,
                "Invalid or expired session in Mcp-Session-Id header",
            ));
        }

        let raw = self.sessions.get_metadata(&session_id).await?;
        let stored = SessionMetadata::from_json(raw.as_deref())?;

        if let Some(principal) = &stored.principal
            && let Err(e) = self.authenticator.check(principal).await
        {
            warn!(session_id = %session_id, subject = %principal.subject, error = %e, "Session re-check failed");
            return Ok(response::jsonrpc_error(
                StatusCode::FORBIDDEN,
                id,
                JsonRpcErrorObject::new(
                    JsonRpcErrorCode::AuthorizationDenied,
                    Some(e.to_string()),
                    None,
                ),
            ));
        }

        // Request-scoped; the shared default stays untouched.
        let metadata = match &stored.transport {
            Some(snapshot) => self.catalog.restore(snapshot)?,
            None => self.metadata.clone(),
        }
        .with_cancellation_scope(session_id.as_str());

        match self.processor.process_value(value, &metadata).await {
            Some(reply) => {
                let headers = match self.record(&session_id, &reply).await? {
                    Some(event_id) => vec![(MCP_EVENT_ID, event_id.to_string())],
                    None => Vec::new(),
                };
                Ok(response::json_rpc(&reply, &headers))
            }
            None => Ok(response::accepted(&[])),
        }
    }

    async fn handle_delete(&self, session_id: Option<String>) -> Result<HttpResponse> {
        let Some(session_id) = session_id else {
            return Ok(response::session_error(None, "Missing Mcp-Session-Id header"));
        };
        if !self.sessions.terminate(&session_id).await? {
            return Ok(response::session_error(
                None,
                "Unknown session in Mcp-Session-Id header",
            ));
        }
        if let Some(events) = &self.events {
            let dropped = events.clear_stream(&session_id).await?;
            debug!(session_id = %session_id, dropped, "Cleared session stream");
        }
        info!(session_id = %session_id, "Terminated MCP session");
        Ok(response::no_content())
    }

    async fn handle_replay(
        &self,
        session_id: Option<String>,
        headers: &HeaderMap,
    ) -> Result<HttpResponse> {
        let Some(events) = &self.events else {
            return Ok(response::method_not_allowed(&self.allowed_methods()));
        };
        let Some(session_id) = session_id else {
            return Ok(response::session_error(None, "Missing Mcp-Session-Id header"));
        };
        if !self.sessions.touch(&session_id).await? {
            return Ok(response::session_error(
                None,
                "Invalid or expired session in Mcp-Session-Id header",
            ));
        }

        let last_event_id = match extract_last_event_id(headers) {
            Ok(last) => last,
            Err(raw) => return Ok(unknown_event(&raw)),
        };
        if let Some(last) = last_event_id {
            let latest = events.latest_event_id(&session_id).await?;
            if latest.is_none_or(|latest| last > latest) {
                return Ok(unknown_event(&last.to_string()));
            }
        }

        let mut frames = String::new();
        let replayed = events
            .replay_after(&session_id, last_event_id, &mut |event: &StoredEvent| {
                frames.push_str(&event.format_sse())
            })
            .await?;
        debug!(session_id = %session_id, last_event_id = ?last_event_id, replayed, "Replayed session stream");
        Ok(response::sse(frames))
    }

    /// Append a reply to the session's stream when streaming is enabled.
    async fn record(&self, session_id: &str, reply: &JsonRpcMessage) -> Result<Option<EventId>> {
        let Some(events) = &self.events else {
            return Ok(None);
        };
        let event_id = events.append(session_id, &Message::from(reply.clone())).await?;
        Ok(Some(event_id))
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    fn transport_name(&self) -> &'static str {
        TRANSPORT
    }

    async fn start(&self) -> std::result::Result<(), TransportError> {
        self.state.transition(TransportState::Starting)?;
        self.state.transition(TransportState::Running)?;
        info!(
            sessions = self.sessions.backend_name(),
            events = ?self.events.as_ref().map(|e| e.backend_name()),
            "HTTP transport running"
        );
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), TransportError> {
        self.state.transition(TransportState::Stopping)?;
        self.state.transition(TransportState::Stopped)
    }

    fn is_running(&self) -> bool {
        self.state.get() == TransportState::Running
    }

    /// Session-less processing against the default metadata.
    async fn handle_message(&self, raw: &str) -> std::result::Result<Option<String>, TransportError> {
        self.state.require_running()?;
        if let Err(e) = self.validator.validate(raw.as_bytes(), Strictness::Lenient) {
            return Ok(Some(malformed_reply(TRANSPORT, e)));
        }
        Ok(self.processor.process(raw, &self.metadata).await)
    }

    /// Broadcast a server-initiated message to every active session's
    /// stream. Needs an event store.
    async fn send_message(&self, raw: &str) -> std::result::Result<(), TransportError> {
        self.state.require_running()?;
        let Some(events) = &self.events else {
            return Err(TransportError::Unsupported {
                transport: TRANSPORT,
                operation: "send_message without an event store",
            });
        };
        let message = Message::parse(raw).map_err(|source| TransportError::MalformedMessage {
            transport: TRANSPORT,
            source,
        })?;

        let sessions = self.sessions.list_active().await.map_err(other)?;
        for session_id in &sessions {
            events.append(session_id, &message).await.map_err(other)?;
        }
        debug!(sessions = sessions.len(), "Broadcast message to session streams");
        Ok(())
    }
}

fn other(e: impl std::fmt::Display) -> TransportError {
    TransportError::Other {
        transport: TRANSPORT,
        message: e.to_string(),
    }
}

fn request_id_of(value: &Value) -> Option<RequestId> {
    value.get("id").and_then(|id| RequestId::from_value(id).ok())
}

fn auth_rejection(id: Option<RequestId>, error: AuthenticationError) -> HttpResponse {
    warn!(error = %error, "Authentication rejected");
    let (status, code) = match error {
        AuthenticationError::Failed(_) => {
            (StatusCode::UNAUTHORIZED, JsonRpcErrorCode::AuthenticationFailed)
        }
        AuthenticationError::Denied(_) => {
            (StatusCode::FORBIDDEN, JsonRpcErrorCode::AuthorizationDenied)
        }
    };
    response::jsonrpc_error(
        status,
        id,
        JsonRpcErrorObject::new(code, Some(error.to_string()), None),
    )
}

fn unknown_event(raw: &str) -> HttpResponse {
    response::jsonrpc_error(
        StatusCode::BAD_REQUEST,
        None,
        JsonRpcErrorObject::new(
            JsonRpcErrorCode::UnknownEventId,
            Some(format!("Unknown Last-Event-ID '{}'", raw)),
            None,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use serde_json::json;
    use strand_mcp_json_rpc::error_codes;
    use strand_mcp_protocol::tools::{CallToolResult, Tool, ToolSchema};
    use strand_mcp_server::{FnTool, ToolRegistry};
    use std::time::Duration;
    use strand_mcp_session_storage::{
        EventStore, InMemoryEventStore, InMemorySessionStore, SessionStorageError, SessionStore,
    };
    use tracing_test::traced_test;

    use crate::auth::{BearerTokenAuthenticator, Principal};

    fn metadata() -> TransportMetadata {
        let echo = FnTool::new(Tool::new("echo", ToolSchema::object()), |args, _ctx| {
            Box::pin(async move { Ok(CallToolResult::text(args.to_string())) })
        });
        TransportMetadata::builder("strand-test", "1.0.0")
            .tools(ToolRegistry::new().with_tool(echo))
            .build()
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(
            MessageProcessor::standard(),
            metadata(),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    fn post(body: Value, session: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(Method::POST).uri("/mcp");
        if let Some(session) = session {
            builder = builder.header(MCP_SESSION_ID, session);
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    fn initialize() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }
        })
    }

    async fn body_of(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn open_session(transport: &HttpTransport) -> String {
        let response = transport.handle_request(post(initialize(), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_initialize_opens_session() {
        let transport = transport();
        let response = transport.handle_request(post(initialize(), None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string();
        assert!(transport.sessions().is_valid(&session_id).await.unwrap());

        let body = body_of(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["serverInfo"]["name"], "strand-test");

        let stored = transport.sessions().get_metadata(&session_id).await.unwrap();
        let stored = SessionMetadata::from_json(stored.as_deref()).unwrap();
        assert_eq!(stored.principal, Some(Principal::anonymous()));
        assert_eq!(stored.transport, Some(transport.metadata().snapshot()));
    }

    #[tokio::test]
    async fn test_session_required_for_other_methods() {
        let transport = transport();
        let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});

        let response = transport.handle_request(post(ping.clone(), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["error"]["code"], error_codes::INVALID_SESSION);
        assert!(body["error"]["message"].as_str().unwrap().contains("Mcp-Session-Id"));

        let response = transport.handle_request(post(ping, Some("no-such-session"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await["error"]["code"], error_codes::INVALID_SESSION);
    }

    #[tokio::test]
    async fn test_session_header_is_case_insensitive() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let request = Request::builder()
            .method(Method::POST)
            .header("mcp-session-id", session_id.as_str())
            .body(Full::new(Bytes::from(
                json!({"jsonrpc": "2.0", "id": "p", "method": "ping"}).to_string(),
            )))
            .unwrap();
        let response = transport.handle_request(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(MCP_SESSION_ID).is_none());
        assert_eq!(body_of(response).await, json!({"jsonrpc": "2.0", "id": "p", "result": {}}));
    }

    #[tokio::test]
    async fn test_notification_gets_empty_200() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let response = transport
            .handle_request(post(
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                Some(session_id.as_str()),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_uses_restored_metadata() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let response = transport
            .handle_request(post(
                json!({
                    "jsonrpc": "2.0",
                    "id": 3,
                    "method": "tools/call",
                    "params": {"name": "echo", "arguments": {"x": 1}}
                }),
                Some(session_id.as_str()),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body["result"]["content"][0]["text"], r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn test_unknown_capability_set_is_500() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let mut snapshot = transport.metadata().snapshot();
        snapshot.capability_set = "elsewhere".to_string();
        let stored = SessionMetadata::new(Principal::anonymous(), snapshot);
        transport
            .sessions()
            .set_metadata(&session_id, stored.to_json().unwrap())
            .await
            .unwrap();

        let response = transport
            .handle_request(post(
                json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
                Some(session_id.as_str()),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_batch_is_invalid_request() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let response = transport
            .handle_request(post(
                json!([{"jsonrpc": "2.0", "id": 1, "method": "ping"}]),
                Some(session_id.as_str()),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_malformed_body_is_parse_error() {
        let transport = transport();
        let request = Request::builder()
            .method(Method::POST)
            .body(Full::new(Bytes::from_static(b"{\"jsonrpc\":")))
            .unwrap();

        let response = transport.handle_request(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(body["id"], Value::Null);
        assert!(logs_contain("Rejecting malformed message"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let transport = transport().with_max_body_size(16);
        let response = transport.handle_request(post(initialize(), None)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_delete_terminates_session() {
        let transport = transport();
        let session_id = open_session(&transport).await;

        let delete = |session: &str| {
            Request::builder()
                .method(Method::DELETE)
                .header(MCP_SESSION_ID, session)
                .body(Full::new(Bytes::new()))
                .unwrap()
        };

        let response = transport.handle_request(delete(&session_id)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!transport.sessions().is_valid(&session_id).await.unwrap());

        let response = transport.handle_request(delete(&session_id)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let transport = transport();
        for method in [Method::GET, Method::PUT, Method::PATCH] {
            let request = Request::builder()
                .method(method)
                .body(Full::new(Bytes::new()))
                .unwrap();
            let response = transport.handle_request(request).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_authentication_failure_is_401() {
        let transport = transport().with_authenticator(Arc::new(
            BearerTokenAuthenticator::new().with_token("t0k3n", Principal::new("alice")),
        ));

        let response = transport.handle_request(post(initialize(), None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(MCP_SESSION_ID).is_none());
        let body = body_of(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["error"]["code"], error_codes::AUTHENTICATION_FAILED);
        assert!(transport.sessions().list_active().await.unwrap().is_empty());

        let request = Request::builder()
            .method(Method::POST)
            .header(http::header::AUTHORIZATION, "Bearer t0k3n")
            .body(Full::new(Bytes::from(initialize().to_string())))
            .unwrap();
        let response = transport.handle_request(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_revoked_principal_is_403() {
        let sessions: BoxedSessionStore = Arc::new(InMemorySessionStore::new());
        let granted = HttpTransport::new(MessageProcessor::standard(), metadata(), Arc::clone(&sessions))
            .with_authenticator(Arc::new(
                BearerTokenAuthenticator::new().with_token("t0k3n", Principal::new("alice")),
            ));
        let request = Request::builder()
            .method(Method::POST)
            .header(http::header::AUTHORIZATION, "Bearer t0k3n")
            .body(Full::new(Bytes::from(initialize().to_string())))
            .unwrap();
        let response = granted.handle_request(request).await;
        let session_id = response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string();

        // Same store, but alice's token is gone.
        let revoked = HttpTransport::new(MessageProcessor::standard(), metadata(), sessions)
            .with_authenticator(Arc::new(BearerTokenAuthenticator::new()));
        let response = revoked
            .handle_request(post(json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}), Some(session_id.as_str())))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_of(response).await["error"]["code"], error_codes::AUTHORIZATION_DENIED);
    }

    #[tokio::test]
    async fn test_failed_initialize_discards_session() {
        let transport = transport();
        let response = transport
            .handle_request(post(
                json!({"jsonrpc": "2.0", "id": 9, "method": "initialize", "params": "nope"}),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(MCP_SESSION_ID).is_none());
        assert!(body_of(response).await.get("error").is_some());
        assert!(transport.sessions().list_active().await.unwrap().is_empty());
    }

    /// Fails every metadata write; everything else goes to `inner`.
    struct ReadOnlyMetadataStore {
        inner: Arc<InMemorySessionStore>,
    }

    #[async_trait]
    impl SessionStore for ReadOnlyMetadataStore {
        fn backend_name(&self) -> &'static str {
            "ReadOnlyMetadata"
        }
        async fn create(&self) -> std::result::Result<String, SessionStorageError> {
            self.inner.create().await
        }
        async fn is_valid(&self, session_id: &str) -> std::result::Result<bool, SessionStorageError> {
            self.inner.is_valid(session_id).await
        }
        async fn touch(&self, session_id: &str) -> std::result::Result<bool, SessionStorageError> {
            self.inner.touch(session_id).await
        }
        async fn terminate(&self, session_id: &str) -> std::result::Result<bool, SessionStorageError> {
            self.inner.terminate(session_id).await
        }
        async fn list_active(&self) -> std::result::Result<Vec<String>, SessionStorageError> {
            self.inner.list_active().await
        }
        async fn set_metadata(
            &self,
            _session_id: &str,
            _metadata: String,
        ) -> std::result::Result<bool, SessionStorageError> {
            Err(SessionStorageError::IoError(std::io::Error::other("disk full")))
        }
        async fn get_metadata(
            &self,
            session_id: &str,
        ) -> std::result::Result<Option<String>, SessionStorageError> {
            self.inner.get_metadata(session_id).await
        }
        async fn cleanup_expired(&self) -> std::result::Result<usize, SessionStorageError> {
            self.inner.cleanup_expired().await
        }
    }

    #[tokio::test]
    async fn test_metadata_write_failure_discards_session() {
        let inner = Arc::new(InMemorySessionStore::new());
        let store = ReadOnlyMetadataStore {
            inner: Arc::clone(&inner),
        };
        let transport = HttpTransport::new(MessageProcessor::standard(), metadata(), Arc::new(store));

        let response = transport.handle_request(post(initialize(), None)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(MCP_SESSION_ID).is_none());
        assert!(inner.list_active().await.unwrap().is_empty());
    }

    fn waiting_transport() -> HttpTransport {
        let wait = FnTool::new(Tool::new("wait", ToolSchema::object()), |_, ctx| {
            Box::pin(async move {
                let outcome = match tokio::time::timeout(Duration::from_millis(300), ctx.cancelled()).await {
                    Ok(()) => "cancelled",
                    Err(_) => "completed",
                };
                Ok(CallToolResult::text(outcome))
            })
        });
        let metadata = TransportMetadata::builder("strand-test", "1.0.0")
            .tools(ToolRegistry::new().with_tool(wait))
            .build();
        HttpTransport::new(
            MessageProcessor::standard(),
            metadata,
            Arc::new(InMemorySessionStore::new()),
        )
    }

    async fn call_and_cancel(
        transport: &HttpTransport,
        caller: &str,
        canceller: &str,
        request_id: i64,
    ) -> String {
        let call = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": "tools/call",
            "params": {"name": "wait"}
        });
        let cancel = json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": request_id}
        });
        let (called, cancelled) = tokio::join!(
            transport.handle_request(post(call, Some(caller))),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                transport.handle_request(post(cancel, Some(canceller))).await
            }
        );
        assert_eq!(cancelled.status(), StatusCode::OK);
        let body = body_of(called).await;
        assert_eq!(body["id"], request_id);
        body["result"]["content"][0]["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_cancellation_is_confined_to_its_session() {
        let transport = waiting_transport();
        let session_a = open_session(&transport).await;
        let session_b = open_session(&transport).await;

        assert_eq!(call_and_cancel(&transport, &session_a, &session_b, 5).await, "completed");
        assert_eq!(call_and_cancel(&transport, &session_a, &session_a, 5).await, "cancelled");
        assert_eq!(transport.metadata().cancellations().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_event_stream_replay() {
        let events: BoxedEventStore = Arc::new(InMemoryEventStore::new());
        let transport = transport().with_event_store(Arc::clone(&events));

        let response = transport.handle_request(post(initialize(), None)).await;
        let session_id = response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string();
        assert_eq!(response.headers()[MCP_EVENT_ID], "1");

        let response = transport
            .handle_request(post(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}), Some(session_id.as_str())))
            .await;
        assert_eq!(response.headers()[MCP_EVENT_ID], "2");
        assert_eq!(events.count_valid(&session_id).await.unwrap(), 2);

        let replay = |last: Option<&str>| {
            let mut builder = Request::builder()
                .method(Method::GET)
                .header(MCP_SESSION_ID, session_id.as_str());
            if let Some(last) = last {
                builder = builder.header(crate::protocol::LAST_EVENT_ID, last);
            }
            builder.body(Full::new(Bytes::new())).unwrap()
        };

        let response = transport.handle_request(replay(Some("1"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "text/event-stream");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("id: 2\n"));
        assert!(!text.contains("id: 1\n"));

        let response = transport.handle_request(replay(Some("99"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await["error"]["code"], error_codes::UNKNOWN_EVENT_ID);

        let response = transport.handle_request(replay(Some("latest"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let delete = Request::builder()
            .method(Method::DELETE)
            .header(MCP_SESSION_ID, session_id.as_str())
            .body(Full::new(Bytes::new()))
            .unwrap();
        transport.handle_request(delete).await;
        assert_eq!(events.count_valid(&session_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transport_contract() {
        let events: BoxedEventStore = Arc::new(InMemoryEventStore::new());
        let transport = transport().with_event_store(Arc::clone(&events));

        assert!(matches!(
            transport.handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await,
            Err(TransportError::NotRunning { .. })
        ));

        transport.start().await.unwrap();
        assert!(transport.is_running());
        assert_eq!(transport.transport_name(), "http");

        let reply = transport
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&reply).unwrap(),
            json!({"jsonrpc": "2.0", "id": 1, "result": {}})
        );

        let session_id = open_session(&transport).await;
        transport
            .send_message(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"progressToken":"t","progress":1}}"#)
            .await
            .unwrap();
        assert_eq!(events.count_valid(&session_id).await.unwrap(), 2);

        transport.stop().await.unwrap();
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn test_send_message_needs_event_store() {
        let transport = transport();
        transport.start().await.unwrap();
        assert!(matches!(
            transport.send_message(r#"{"jsonrpc":"2.0","method":"ping"}"#).await,
            Err(TransportError::Unsupported { .. })
        ));
    }
}
