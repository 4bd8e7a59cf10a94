//! Tool-backed protocol server

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{McpHandler, RoutingKey};
use crate::{
    error::{McpError, McpResult},
    protocol::{
        negotiate_version, InitializeParams, InitializeResult, JsonRpcRequest,
        ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCallResult, ToolsCapability,
        ToolsListResult,
    },
    tools::{CredentialStore, ToolExecutionContext, ToolRegistry},
};

/// Answers MCP methods for one routing key from a tool registry
pub struct ToolServer {
    key: RoutingKey,
    tools: Arc<dyn ToolRegistry>,
    credentials: Arc<dyn CredentialStore>,
}

impl ToolServer {
    pub fn new(
        key: RoutingKey,
        tools: Arc<dyn ToolRegistry>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            key,
            tools,
            credentials,
        }
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: "switchboard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        info!(
            "Client {} {} initializing {} (protocol {})",
            params.client_info.name,
            params.client_info.version,
            self.key,
            params.protocol_version
        );

        InitializeResult {
            protocol_version: negotiate_version(&params.protocol_version).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                logging: None,
            },
            server_info: self.server_info(),
        }
    }

    async fn call_tool(&self, params: ToolsCallParams) -> McpResult<ToolsCallResult> {
        let tool = self
            .tools
            .get_tool(&params.name)
            .ok_or_else(|| McpError::ToolNotFound {
                name: params.name.clone(),
            })?;

        let context = ToolExecutionContext::new(self.key.clone())
            .with_arguments(params.arguments.unwrap_or_else(|| json!({})))
            .with_access_token(
                self.credentials
                    .access_token(&self.key.tenant_id, tool.app()),
            );

        match tool.execute(context).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Tool {} failed for {}: {}", params.name, self.key, e);
                Ok(ToolsCallResult::error(e.to_string()))
            }
        }
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParams {
        method: method.to_string(),
        details: "missing params".to_string(),
    })?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams {
        method: method.to_string(),
        details: e.to_string(),
    })
}

#[async_trait]
impl McpHandler for ToolServer {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        debug!("Handling {} for {}", request.method, self.key);

        match request.method.as_str() {
            "initialize" => {
                let params = parse_params(&request.method, request.params)?;
                Ok(serde_json::to_value(self.initialize(params))?)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(serde_json::to_value(ToolsListResult {
                tools: self.tools.list_tools(),
                next_cursor: None,
            })?),
            "tools/call" => {
                let params = parse_params(&request.method, request.params)?;
                Ok(serde_json::to_value(self.call_tool(params).await?)?)
            }
            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized for {}", self.key),
            other => debug!("Ignoring notification {} for {}", other, self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{Tool, ToolContent},
        tools::{InMemoryToolRegistry, McpTool, StaticCredentials},
    };

    struct TokenEcho;

    #[async_trait]
    impl McpTool for TokenEcho {
        fn app(&self) -> &str {
            "gmail"
        }

        fn definition(&self) -> Tool {
            Tool {
                name: "whoami".to_string(),
                description: "Echo the token".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, context: ToolExecutionContext) -> McpResult<ToolsCallResult> {
            match context.access_token {
                Some(token) => Ok(ToolsCallResult::text(token)),
                None => Err(McpError::internal("no token")),
            }
        }
    }

    fn server(tenant: &str) -> ToolServer {
        let mut tools = InMemoryToolRegistry::new();
        tools.register_tool(Arc::new(TokenEcho));
        let credentials = StaticCredentials::default().with_token("tenant-a", "gmail", "secret");
        ToolServer::new(
            RoutingKey::tenant(tenant),
            Arc::new(tools),
            Arc::new(credentials),
        )
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(method, Some(params), Some(json!(1)))
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let result = server("tenant-a")
            .handle_request(request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "inspector", "version": "1"}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "switchboard");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_tools_list_and_call_use_tenant_credentials() {
        let server = server("tenant-a");

        let list = server
            .handle_request(request("tools/list", json!({})))
            .await
            .unwrap();
        assert_eq!(list["tools"][0]["name"], "whoami");

        let call = server
            .handle_request(request("tools/call", json!({"name": "whoami"})))
            .await
            .unwrap();
        let call: ToolsCallResult = serde_json::from_value(call).unwrap();
        assert_eq!(
            call.content,
            vec![ToolContent::Text {
                text: "secret".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_in_result() {
        let call = server("tenant-b")
            .handle_request(request("tools/call", json!({"name": "whoami"})))
            .await
            .unwrap();
        assert_eq!(call["isError"], true);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server("tenant-a");

        let err = server
            .handle_request(request("tools/call", json!({"name": "missing"})))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), -32602);

        let err = server
            .handle_request(request("resources/list", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), -32601);

        let err = server
            .handle_request(JsonRpcRequest::new("tools/call", None, Some(json!(2))))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams { .. }));
    }
}
