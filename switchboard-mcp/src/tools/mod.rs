//! Callable tools exposed by the default protocol server

pub mod gmail;

pub use gmail::ListMessagesTool;

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

use crate::{
    error::McpResult,
    protocol::{Tool, ToolsCallResult},
    server::RoutingKey,
};

/// Everything a tool needs to run one call
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    /// Routing key of the session making the call
    pub key: RoutingKey,

    /// Tool arguments
    pub arguments: Value,

    /// OAuth access token for the tool's app, when one is configured
    pub access_token: Option<String>,
}

impl ToolExecutionContext {
    pub fn new(key: RoutingKey) -> Self {
        Self {
            key,
            arguments: Value::Null,
            access_token: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }
}

/// A callable tool belonging to one app integration
#[async_trait]
pub trait McpTool: Send + Sync {
    /// App slug the tool belongs to, e.g. `gmail`
    fn app(&self) -> &str;

    /// Metadata advertised through `tools/list`
    fn definition(&self) -> Tool;

    async fn execute(&self, context: ToolExecutionContext) -> McpResult<ToolsCallResult>;
}

/// Lookup of the tools available to a protocol server
pub trait ToolRegistry: Send + Sync {
    fn list_tools(&self) -> Vec<Tool>;

    fn get_tool(&self, name: &str) -> Option<Arc<dyn McpTool>>;
}

/// Simple in-memory tool registry implementation
#[derive(Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, Arc<dyn McpTool>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register_tool(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    /// Registry holding only the tools of one app
    pub fn for_app(&self, app: &str) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(_, tool)| tool.app() == app)
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
        }
    }

    pub fn has_app(&self, app: &str) -> bool {
        self.tools.values().any(|tool| tool.app() == app)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|tool| tool.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    fn get_tool(&self, name: &str) -> Option<Arc<dyn McpTool>> {
        self.tools.get(name).cloned()
    }
}

/// Source of per-tenant OAuth tokens
pub trait CredentialStore: Send + Sync {
    fn access_token(&self, tenant_id: &str, app: &str) -> Option<String>;
}

/// Credentials loaded from configuration: tenant → app → access token
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new(tokens: HashMap<String, HashMap<String, String>>) -> Self {
        Self { tokens }
    }

    pub fn with_token(
        mut self,
        tenant_id: impl Into<String>,
        app: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.tokens
            .entry(tenant_id.into())
            .or_default()
            .insert(app.into(), token.into());
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn access_token(&self, tenant_id: &str, app: &str) -> Option<String> {
        self.tokens
            .get(tenant_id)
            .and_then(|apps| apps.get(app))
            .cloned()
    }
}
