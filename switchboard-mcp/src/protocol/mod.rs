//! MCP protocol implementation
//!
//! JSON-RPC 2.0 envelopes, the MCP payloads the gateway's default server
//! speaks, and the handshake predicate the router consults before starting a
//! session.

pub mod jsonrpc;
pub mod messages;

pub use jsonrpc::*;
pub use messages::*;

use serde_json::Value;

/// Latest MCP protocol version supported by the gateway
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions accepted during negotiation, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05", "2024-10-07"];

/// Header carrying the streamable HTTP session id
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// SSE resumption hint sent by reconnecting clients
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Client-side conversation id used for the correlation index
pub const CHAT_ID_HEADER: &str = "x-pd-mcp-chat-id";

/// Notification pushed once when an SSE stream is opened
pub const CONNECTION_ESTABLISHED: &str = "connection_established";

/// Notification pushed periodically on open SSE streams
pub const KEEPALIVE: &str = "keepalive";

/// Build a parameterless server-to-client notification
pub fn notification(method: &str) -> JsonRpcMessage {
    JsonRpcMessage::Request(JsonRpcRequest::notification(method, None))
}

/// Check whether a JSON value is an MCP `initialize` request.
///
/// The value must be a JSON-RPC 2.0 request object (non-null id) whose params
/// carry a string `protocolVersion`, a `capabilities` object and a
/// `clientInfo` object with a string `name`.
pub fn is_initialize_request(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION)
        || object.get("method").and_then(Value::as_str) != Some("initialize")
    {
        return false;
    }

    match object.get("id") {
        Some(Value::String(_)) | Some(Value::Number(_)) => {}
        _ => return false,
    }

    let Some(params) = object.get("params").and_then(Value::as_object) else {
        return false;
    };

    params.get("protocolVersion").is_some_and(Value::is_string)
        && params.get("capabilities").is_some_and(Value::is_object)
        && params
            .get("clientInfo")
            .and_then(|info| info.get("name"))
            .is_some_and(Value::is_string)
}

/// Pick the protocol version to answer an initialize request with
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|version| **version == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}
