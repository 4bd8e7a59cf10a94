//! Gmail tools

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{McpTool, ToolExecutionContext};
use crate::{
    error::{McpError, McpResult},
    protocol::{Tool, ToolsCallResult},
};

/// App slug for Gmail tools and credentials
pub const GMAIL_APP: &str = "gmail";

/// Public Gmail API base URL
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

const DEFAULT_MAX_RESULTS: u64 = 5;

/// Lists the user's Gmail messages
#[derive(Debug, Clone)]
pub struct ListMessagesTool {
    client: Client,
    base_url: Url,
}

impl ListMessagesTool {
    pub fn new(base_url: &str) -> McpResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn messages_url(&self, max_results: u64) -> McpResult<Url> {
        let mut url = self.base_url.join("/gmail/v1/users/me/messages")?;
        url.query_pairs_mut()
            .append_pair("maxResults", &max_results.to_string());
        Ok(url)
    }
}

#[async_trait]
impl McpTool for ListMessagesTool {
    fn app(&self) -> &str {
        GMAIL_APP
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "listMessages".to_string(),
            description: "List the user's Gmail messages".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "maxResults": {
                        "type": "number",
                        "default": DEFAULT_MAX_RESULTS
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, context: ToolExecutionContext) -> McpResult<ToolsCallResult> {
        let Some(token) = context.access_token else {
            return Ok(ToolsCallResult::error(format!(
                "No Gmail credentials configured for tenant '{}'",
                context.key.tenant_id
            )));
        };

        let max_results = context
            .arguments
            .get("maxResults")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let url = self.messages_url(max_results)?;
        debug!("Listing Gmail messages for {}: {}", context.key, url);

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        let text = serde_json::to_string_pretty(&body)?;
        if status.is_success() {
            Ok(ToolsCallResult::text(text))
        } else {
            Ok(ToolsCallResult::error(format!(
                "Gmail API returned {}: {}",
                status, text
            )))
        }
    }
}
