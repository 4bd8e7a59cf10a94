//! Protocol servers and the factory that builds them per routing key

pub mod factory;
pub mod service;

pub use factory::ToolServerFactory;
pub use service::ToolServer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use crate::{
    error::{McpError, McpResult},
    protocol::{
        JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
        JSONRPC_VERSION,
    },
    transport::McpTransport,
};

/// Which protocol-server configuration to instantiate for a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    pub tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl RoutingKey {
    /// Tenant-scoped key (stateful and SSE routes)
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            app_id: None,
        }
    }

    /// App-scoped key (stateless route)
    pub fn app(tenant_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            app_id: Some(app_id.into()),
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.app_id {
            Some(app) => write!(f, "{}/{}", self.tenant_id, app),
            None => write!(f, "{}", self.tenant_id),
        }
    }
}

/// Method dispatch behind a protocol server
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// Answer a request; errors become JSON-RPC error responses
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value>;

    /// React to a client notification
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        debug!("Ignoring notification: {}", notification.method);
    }
}

/// A protocol-server instance bound to one routing key
pub struct ProtocolServer {
    key: RoutingKey,
    handler: Arc<dyn McpHandler>,
}

impl ProtocolServer {
    pub fn new(key: RoutingKey, handler: Arc<dyn McpHandler>) -> Self {
        Self { key, handler }
    }

    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    /// Attach this server to a transport so it answers the transport's messages
    pub fn connect(self: &Arc<Self>, transport: &dyn McpTransport) -> McpResult<()> {
        transport.attach(Arc::clone(self))?;
        debug!(
            "Protocol server for {} connected to {} transport",
            self.key,
            transport.kind()
        );
        Ok(())
    }

    /// Process one inbound message, returning the response for requests
    pub async fn dispatch(&self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(request) if request.is_notification() => {
                self.handler.handle_notification(request).await;
                None
            }
            JsonRpcMessage::Request(request) => {
                let id = request.id.clone();
                if request.jsonrpc != JSONRPC_VERSION {
                    return Some(JsonRpcResponse::error(
                        JsonRpcError::new(
                            JsonRpcErrorCode::InvalidRequest as i32,
                            "Invalid Request",
                            None,
                        ),
                        id,
                    ));
                }

                let method = request.method.clone();
                match self.handler.handle_request(request).await {
                    Ok(result) => Some(JsonRpcResponse::success(result, id)),
                    Err(error) => {
                        log_failure(&self.key, &method, &error);
                        Some(JsonRpcResponse::error(error.to_jsonrpc_error(), id))
                    }
                }
            }
            JsonRpcMessage::Response(response) => {
                debug!(
                    "Dropping client response for {}: id {:?}",
                    self.key, response.id
                );
                None
            }
        }
    }
}

impl fmt::Debug for ProtocolServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolServer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

fn log_failure(key: &RoutingKey, method: &str, error: &McpError) {
    if error.status_code().is_server_error() {
        warn!("Request {} for {} failed: {}", method, key, error);
    } else {
        debug!("Request {} for {} rejected: {}", method, key, error);
    }
}

/// Produces protocol-server instances bound to a routing key
#[async_trait]
pub trait ServerFactory: Send + Sync {
    async fn create(&self, key: &RoutingKey) -> McpResult<ProtocolServer>;
}
