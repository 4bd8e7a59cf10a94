//! Default server factory: one [`ToolServer`] per routing key

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ProtocolServer, RoutingKey, ServerFactory, ToolServer};
use crate::{
    error::{McpError, McpResult},
    tools::{CredentialStore, InMemoryToolRegistry, ToolRegistry},
};

/// Builds tool-backed protocol servers from a shared tool catalog.
///
/// App-scoped keys see only their app's tools; tenant-scoped keys see the
/// whole catalog.
pub struct ToolServerFactory {
    catalog: InMemoryToolRegistry,
    credentials: Arc<dyn CredentialStore>,
}

impl ToolServerFactory {
    pub fn new(catalog: InMemoryToolRegistry, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            catalog,
            credentials,
        }
    }

    pub fn catalog(&self) -> &InMemoryToolRegistry {
        &self.catalog
    }
}

#[async_trait]
impl ServerFactory for ToolServerFactory {
    async fn create(&self, key: &RoutingKey) -> McpResult<ProtocolServer> {
        let tools: Arc<dyn ToolRegistry> = match &key.app_id {
            Some(app) if !self.catalog.has_app(app) => {
                return Err(McpError::Configuration {
                    message: format!("Unknown app: {}", app),
                });
            }
            Some(app) => Arc::new(self.catalog.for_app(app)),
            None => Arc::new(self.catalog.clone()),
        };

        debug!("Starting protocol server for {}", key);
        let handler = ToolServer::new(key.clone(), tools, Arc::clone(&self.credentials));
        Ok(ProtocolServer::new(key.clone(), Arc::new(handler)))
    }
}
