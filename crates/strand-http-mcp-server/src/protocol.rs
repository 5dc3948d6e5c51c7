//! MCP HTTP header names and request inspection helpers.

use http::HeaderMap;
use serde_json::Value;

use strand_mcp_protocol::methods;
use strand_mcp_session_storage::EventId;

/// Session token header. Lookup is case-insensitive.
pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";
/// Older clients send the session id under this name.
pub const X_MCP_SESSION_ID: &str = "X-Mcp-Session-Id";
/// Id of the stream event a response was recorded as.
pub const MCP_EVENT_ID: &str = "Mcp-Event-Id";
/// SSE resumption header.
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Extract MCP session ID from HTTP request headers
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    [MCP_SESSION_ID, X_MCP_SESSION_ID]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Extract Last-Event-ID from HTTP request headers for SSE resumability.
///
/// `Err` carries the raw header when it is present but not an event id.
pub fn extract_last_event_id(headers: &HeaderMap) -> Result<Option<EventId>, String> {
    let Some(value) = headers.get(LAST_EVENT_ID) else {
        return Ok(None);
    };
    let raw = value.to_str().map_err(|_| "<binary>".to_string())?;
    raw.parse::<EventId>().map(Some).map_err(|_| raw.to_string())
}

/// Whether a decoded body asks to start a session: an `initialize` request,
/// alone or first in a batch.
pub fn is_initialize_request(body: &Value) -> bool {
    let first = match body {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    first
        .and_then(|m| m.get("method"))
        .and_then(Value::as_str)
        .is_some_and(|method| method == methods::INITIALIZE)
}
