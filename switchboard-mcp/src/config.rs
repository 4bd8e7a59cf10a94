//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

use crate::{
    error::{McpError, McpResult},
    keepalive::DEFAULT_KEEPALIVE_INTERVAL,
    tools::{gmail::GMAIL_API_BASE, StaticCredentials},
};

/// Configuration for the Switchboard gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interval between keepalive notifications on SSE streams
    #[serde(with = "humantime_serde", default = "default_keepalive_interval")]
    pub keepalive_interval: Duration,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub gmail: GmailConfig,

    /// OAuth access tokens: tenant → app → token
    #[serde(default)]
    pub credentials: HashMap<String, HashMap<String, String>>,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_interval: default_keepalive_interval(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
            gmail: GmailConfig::default(),
            credentials: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `switchboard_mcp=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_gmail_base_url")]
    pub base_url: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            base_url: default_gmail_base_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3010
}

fn default_keepalive_interval() -> Duration {
    DEFAULT_KEEPALIVE_INTERVAL
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_gmail_base_url() -> String {
    GMAIL_API_BASE.to_string()
}

impl SwitchboardConfig {
    /// Load configuration from a YAML file
    pub async fn from_file(path: &str) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| McpError::Configuration {
                message: format!("Failed to read config file '{}': {}", path, e),
            })?;

        Self::from_yaml(&content).map_err(|e| McpError::Configuration {
            message: format!("Invalid config file '{}': {}", path, e),
        })
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> McpResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| McpError::Configuration {
            message: format!("Failed to parse configuration: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> McpResult<()> {
        if self.host.trim().is_empty() {
            return Err(McpError::Configuration {
                message: "host cannot be empty".to_string(),
            });
        }

        if self.port == 0 {
            return Err(McpError::Configuration {
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.keepalive_interval.is_zero() {
            return Err(McpError::Configuration {
                message: "keepalive_interval cannot be 0".to_string(),
            });
        }

        url::Url::parse(&self.gmail.base_url).map_err(|e| McpError::Configuration {
            message: format!("Invalid gmail.base_url '{}': {}", self.gmail.base_url, e),
        })?;

        Ok(())
    }

    /// Merge with environment variables
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("SWITCHBOARD_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("SWITCHBOARD_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }

        if let Ok(level) = std::env::var("SWITCHBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(interval) = std::env::var("SWITCHBOARD_KEEPALIVE") {
            if let Ok(interval) = humantime_serde::re::humantime::parse_duration(&interval) {
                self.keepalive_interval = interval;
            }
        }

        self
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Credential store built from the `credentials` table
    pub fn credential_store(&self) -> StaticCredentials {
        StaticCredentials::new(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CredentialStore;

    #[test]
    fn test_default_config() {
        let config = SwitchboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 3010);
        assert_eq!(config.keepalive_interval, Duration::from_secs(20));
        assert_eq!(config.bind_address(), "0.0.0.0:3010");
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_yaml_config() {
        let config = SwitchboardConfig::from_yaml(
            r#"
port: 8080
keepalive_interval: 5s
logging:
  level: debug
gmail:
  base_url: http://127.0.0.1:9000
credentials:
  tenant-a:
    gmail: token-a
"#,
        )
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.credential_store().access_token("tenant-a", "gmail"),
            Some("token-a".to_string())
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = SwitchboardConfig::default();

        config.port = 0;
        assert!(config.validate().is_err());
        config.port = 3010;

        config.keepalive_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.keepalive_interval = Duration::from_secs(20);

        config.gmail.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("SWITCHBOARD_HOST", "127.0.0.1");
        std::env::set_var("SWITCHBOARD_PORT", "4000");
        std::env::set_var("SWITCHBOARD_KEEPALIVE", "45s");

        let config = SwitchboardConfig::default().with_env_overrides();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.keepalive_interval, Duration::from_secs(45));

        std::env::remove_var("SWITCHBOARD_HOST");
        std::env::remove_var("SWITCHBOARD_PORT");
        std::env::remove_var("SWITCHBOARD_KEEPALIVE");
    }
}
