//! HTTP transport session lifecycle driven through hyper requests, without
//! binding sockets.

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};
use strand_http_mcp_server::{
    HttpTransport, LAST_EVENT_ID, MCP_EVENT_ID, MCP_SESSION_ID, X_MCP_SESSION_ID,
};
use strand_mcp_json_rpc::error_codes;
use strand_mcp_protocol::tools::{CallToolResult, Tool, ToolSchema};
use strand_mcp_server::{
    CapabilityCatalog, CapabilitySet, FnTool, MessageProcessor, PromptRegistry, ResourceRegistry,
    ToolRegistry, TransportMetadata,
};
use strand_mcp_session_storage::{BoxedEventStore, InMemoryEventStore, InMemorySessionStore};

type HttpResponse = http::Response<Full<Bytes>>;

fn tool(name: &'static str) -> FnTool {
    FnTool::new(Tool::new(name, ToolSchema::object()), move |_args, _ctx| {
        Box::pin(async move { Ok(CallToolResult::text(name)) })
    })
}

fn initialize(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "lifecycle", "version": "1.0"}
        }
    })
}

fn request(method: Method, session: Option<(&str, &str)>, body: Option<Value>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri("/mcp");
    if let Some((header, value)) = session {
        builder = builder.header(header, value);
    }
    let body = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
    builder.body(Full::new(body)).unwrap()
}

async fn json_body(response: HttpResponse) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: HttpResponse) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn open_session(transport: &HttpTransport) -> String {
    let response = transport
        .handle_request(request(Method::POST, None, Some(initialize(1))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_lifecycle_with_stream_resumption() {
    let metadata = TransportMetadata::builder("lifecycle", "1.0.0")
        .tools(ToolRegistry::new().with_tool(tool("hello")))
        .build();
    let events: BoxedEventStore = Arc::new(InMemoryEventStore::new());
    let transport = HttpTransport::new(
        MessageProcessor::standard(),
        metadata,
        Arc::new(InMemorySessionStore::new()),
    )
    .with_event_store(Arc::clone(&events));

    // initialize
    let response = transport
        .handle_request(request(Method::POST, None, Some(initialize(1))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response.headers()[MCP_SESSION_ID].to_str().unwrap().to_string();
    let session = Some((MCP_SESSION_ID, session_id.as_str()));

    // initialized notification: no reply, no event
    let response = transport
        .handle_request(request(
            Method::POST,
            session,
            Some(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(MCP_EVENT_ID).is_none());
    assert!(text_body(response).await.is_empty());

    // tools/list and tools/call through the legacy header name
    let legacy = Some((X_MCP_SESSION_ID, session_id.as_str()));
    let response = transport
        .handle_request(request(
            Method::POST,
            legacy,
            Some(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})),
        ))
        .await;
    assert_eq!(response.headers()[MCP_EVENT_ID], "2");
    assert_eq!(json_body(response).await["result"]["tools"][0]["name"], "hello");

    let response = transport
        .handle_request(request(
            Method::POST,
            session,
            Some(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "hello"}})),
        ))
        .await;
    assert_eq!(response.headers()[MCP_EVENT_ID], "3");
    assert_eq!(json_body(response).await["result"]["content"][0]["text"], "hello");

    // reconnect after event 1: events 2 and 3 come back in order
    let mut replay = request(Method::GET, session, None);
    replay.headers_mut().insert(LAST_EVENT_ID, "1".parse().unwrap());
    let response = transport.handle_request(replay).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stream = text_body(response).await;
    let ids: Vec<&str> = stream
        .lines()
        .filter_map(|line| line.strip_prefix("id: "))
        .collect();
    assert_eq!(ids, vec!["2", "3"]);
    assert!(stream.contains(r#""id":3"#));

    // full replay without Last-Event-ID
    let response = transport.handle_request(request(Method::GET, session, None)).await;
    assert_eq!(text_body(response).await.matches("event: message").count(), 3);

    // terminate
    let response = transport.handle_request(request(Method::DELETE, session, None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = transport
        .handle_request(request(
            Method::POST,
            session,
            Some(json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], error_codes::INVALID_SESSION);
    assert!(body["error"]["message"].as_str().unwrap().contains("Mcp-Session-Id"));
}

#[tokio::test]
async fn test_snapshot_substitution_is_request_scoped() {
    let public = TransportMetadata::builder("multi", "1.0.0")
        .tools(ToolRegistry::new().with_tool(tool("public_tool")))
        .build();
    let admin = TransportMetadata::builder("multi", "1.0.0")
        .capability_set("admin")
        .tools(ToolRegistry::new().with_tool(tool("admin_tool")))
        .build();

    let mut catalog = CapabilityCatalog::from_metadata(&public);
    catalog.register(
        "admin",
        CapabilitySet::new(
            admin.tools().clone(),
            PromptRegistry::new(),
            ResourceRegistry::new(),
        ),
    );

    let sessions = Arc::new(InMemorySessionStore::new());
    let public_transport = HttpTransport::new(
        MessageProcessor::standard(),
        public.clone(),
        sessions.clone(),
    )
    .with_catalog(catalog.clone());
    let admin_transport = HttpTransport::new(MessageProcessor::standard(), admin, sessions)
        .with_catalog(catalog);

    let admin_session = open_session(&admin_transport).await;
    let public_session = open_session(&public_transport).await;

    let list = json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"});

    // The admin session resumes on the public transport with its own tools.
    let response = public_transport
        .handle_request(request(
            Method::POST,
            Some((MCP_SESSION_ID, admin_session.as_str())),
            Some(list.clone()),
        ))
        .await;
    assert_eq!(json_body(response).await["result"]["tools"][0]["name"], "admin_tool");

    let response = public_transport
        .handle_request(request(
            Method::POST,
            Some((MCP_SESSION_ID, public_session.as_str())),
            Some(list),
        ))
        .await;
    assert_eq!(json_body(response).await["result"]["tools"][0]["name"], "public_tool");

    assert_eq!(public_transport.metadata().capability_set_id(), public.capability_set_id());
    assert_eq!(public_transport.metadata().tools().get_all().len(), 1);
}
