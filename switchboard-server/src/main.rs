use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::info;

use switchboard_mcp::{SwitchboardConfig, ToolRegistry};
use switchboard_server::{build_catalog, logging::init_tracing, serve, Cli, Commands};

async fn load_config(path: Option<&Path>) -> Result<SwitchboardConfig> {
    let config = match path {
        Some(path) => SwitchboardConfig::from_file(&path.to_string_lossy())
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => SwitchboardConfig::default(),
    };
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        host: None,
        port: None,
    }) {
        Commands::Serve { config, host, port } => {
            let mut config = load_config(config.as_deref()).await?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;

            init_tracing(Some(cli.log_level.as_deref().unwrap_or(&config.logging.level)))?;
            info!("Starting Switchboard {}", env!("CARGO_PKG_VERSION"));
            serve(config).await
        }

        Commands::ValidateConfig { config } => {
            let config = load_config(Some(&config)).await?;
            config.validate()?;
            println!("Configuration is valid");
            println!("  bind address: {}", config.bind_address());
            println!("  keepalive:    {:?}", config.keepalive_interval);
            println!("  tenants:      {}", config.credentials.len());
            Ok(())
        }

        Commands::PrintConfig { config } => {
            let mut config = load_config(config.as_deref()).await?;
            for tokens in config.credentials.values_mut() {
                tokens.values_mut().for_each(|token| *token = "<redacted>".to_string());
            }
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }

        Commands::Tools => {
            let config = SwitchboardConfig::default().with_env_overrides();
            for tool in build_catalog(&config)?.list_tools() {
                println!("{:<20} {}", tool.name, tool.description);
            }
            Ok(())
        }
    }
}
