//! Response builders for the HTTP transport.
//!
//! JSON-RPC errors produced by the processor travel with status 200; only
//! transport-level failures (sessions, auth, methods, size) change the
//! status code.

use bytes::Bytes;
use http::{Method, Response, StatusCode, header};
use http_body_util::Full;
use tracing::error;

use strand_mcp_json_rpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcMessage, Message, RequestId,
};

pub type HttpResponse = Response<Full<Bytes>>;

/// Finish a builder. Builders only fail on invalid header values, which
/// become a bare 500.
fn finish(builder: http::response::Builder, body: impl Into<Bytes>) -> HttpResponse {
    builder.body(Full::new(body.into())).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build HTTP response");
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// 200 with the JSON-RPC reply, plus any extra headers.
pub fn json_rpc(reply: &JsonRpcMessage, headers: &[(&str, String)]) -> HttpResponse {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    finish(builder, reply.to_json_string())
}

/// 200 with an already serialized JSON-RPC message.
pub fn json_body(body: String) -> HttpResponse {
    finish(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json"),
        body,
    )
}

/// 200 with an empty body: the message needed no reply.
pub fn accepted(headers: &[(&str, String)]) -> HttpResponse {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    finish(builder, Bytes::new())
}

/// JSON-RPC error body with a non-200 status.
pub fn jsonrpc_error(
    status: StatusCode,
    id: Option<RequestId>,
    error: JsonRpcErrorObject,
) -> HttpResponse {
    let body = Message::from(JsonRpcError::new(id, error)).to_json_string();
    finish(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json"),
        body,
    )
}

/// 400 for a missing, unknown or expired session.
pub fn session_error(id: Option<RequestId>, message: &str) -> HttpResponse {
    jsonrpc_error(
        StatusCode::BAD_REQUEST,
        id,
        JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidSession, Some(message.to_string()), None),
    )
}

pub fn no_content() -> HttpResponse {
    finish(Response::builder().status(StatusCode::NO_CONTENT), Bytes::new())
}

pub fn method_not_allowed(allowed: &[Method]) -> HttpResponse {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    finish(
        Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(header::ALLOW, allow),
        Bytes::new(),
    )
}

pub fn payload_too_large(limit: usize) -> HttpResponse {
    jsonrpc_error(
        StatusCode::PAYLOAD_TOO_LARGE,
        None,
        JsonRpcErrorObject::invalid_request(Some(format!(
            "Request body exceeds {} bytes",
            limit
        ))),
    )
}

pub fn not_found() -> HttpResponse {
    finish(Response::builder().status(StatusCode::NOT_FOUND), Bytes::new())
}

/// Generic 500. Details stay in the log.
pub fn internal_error() -> HttpResponse {
    jsonrpc_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        None,
        JsonRpcErrorObject::internal_error("Internal server error"),
    )
}

/// `text/event-stream` body made of pre-formatted SSE frames.
pub fn sse(frames: String) -> HttpResponse {
    finish(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache"),
        frames,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use strand_mcp_json_rpc::error_codes;

    async fn body_json(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_error_shape() {
        let response = session_error(Some(RequestId::Number(4)), "Missing Mcp-Session-Id header");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["id"], 4);
        assert_eq!(body["error"]["code"], error_codes::INVALID_SESSION);
        assert!(body["error"]["message"].as_str().unwrap().contains("Mcp-Session-Id"));
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let response = internal_error();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], error_codes::INTERNAL_ERROR);
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let response = method_not_allowed(&[Method::POST, Method::DELETE]);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST, DELETE");
    }

    #[test]
    fn test_invalid_header_value_falls_back_to_500() {
        let reply: JsonRpcMessage =
            strand_mcp_json_rpc::JsonRpcResponse::new(RequestId::Number(1), Value::Null).into();
        let response = json_rpc(&reply, &[("Mcp-Session-Id", "bad\nvalue".to_string())]);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
