//! Transport layer abstractions for MCP sessions
//!
//! A transport wraps one client connection (an SSE stream or a streamable
//! HTTP exchange). The router feeds raw HTTP requests into it, the connected
//! [`ProtocolServer`] answers them, and lifecycle observers learn when the
//! transport is initialised or closed.

pub mod sse;
pub mod streamable_http;

pub use sse::SseTransport;
pub use streamable_http::{StreamableHttpConfig, StreamableHttpTransport};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::protocol::{JsonRpcMessage, SESSION_ID_HEADER};
use crate::server::ProtocolServer;
use crate::McpResult;

/// Shared handle to a live transport, as stored in the session registry
pub type TransportHandle = Arc<dyn McpTransport>;

/// Which wire style a transport speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Legacy SSE stream plus POSTed messages
    Sse,
    /// Streamable HTTP (POST/GET/DELETE on one endpoint)
    Streamable,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::Streamable => write!(f, "streamable"),
        }
    }
}

/// An inbound HTTP call as seen by a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new(method: Method, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            headers,
            body,
        }
    }

    /// Value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Session id carried by the `mcp-session-id` header
    pub fn session_id(&self) -> Option<&str> {
        self.header(SESSION_ID_HEADER)
    }
}

/// Transport trait for server-side MCP sessions
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Wire style of this transport
    fn kind(&self) -> TransportKind;

    /// Session id, once assigned
    fn session_id(&self) -> Option<String>;

    /// Bind the protocol server that answers this transport's messages.
    /// Fails if a server is already attached or the transport is closed.
    fn attach(&self, server: Arc<ProtocolServer>) -> McpResult<()>;

    /// Feed one HTTP call into the live exchange and produce its response
    async fn handle_request(&self, request: TransportRequest) -> McpResult<Response>;

    /// Push a message to the client over the open stream
    fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Tear the transport down and notify observers. Idempotent.
    fn close(&self);

    /// Whether [`McpTransport::close`] has run
    fn is_closed(&self) -> bool;
}

/// Lifecycle hooks registered when a transport is built
pub trait TransportObserver: Send + Sync {
    /// The handshake assigned `session_id` to `transport`
    fn on_session_initialized(&self, _session_id: &str, _transport: &TransportHandle) {}

    /// The transport closed; runs once per transport
    fn on_close(&self, _session_id: Option<&str>) {}
}

/// Source of fresh session ids
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUID v4 session ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Run every observer's close hook
pub(crate) fn notify_closed(observers: &[Arc<dyn TransportObserver>], session_id: Option<&str>) {
    for observer in observers {
        observer.on_close(session_id);
    }
}
