//! Server startup and shutdown logic

use anyhow::{Context, Result};
use axum::{http::HeaderName, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use switchboard_mcp::{
    protocol::SESSION_ID_HEADER, routes, GatewayState, InMemoryToolRegistry, ListMessagesTool,
    McpTool, SwitchboardConfig, ToolServerFactory,
};

/// Tool catalog served by the gateway
pub fn build_catalog(config: &SwitchboardConfig) -> Result<InMemoryToolRegistry> {
    let gmail: Arc<dyn McpTool> = Arc::new(
        ListMessagesTool::new(&config.gmail.base_url).context("Failed to create Gmail tool")?,
    );

    let mut catalog = InMemoryToolRegistry::new();
    catalog.register_tool(gmail);
    Ok(catalog)
}

/// CORS for browser clients; the session header must be readable by scripts
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
}

/// Build the complete application router
pub fn build_app(config: &SwitchboardConfig) -> Result<Router> {
    let factory = ToolServerFactory::new(build_catalog(config)?, Arc::new(config.credential_store()));
    let state =
        GatewayState::new(Arc::new(factory)).with_keepalive_interval(config.keepalive_interval);

    let mut app = routes(state).layer(TraceLayer::new_for_http());
    if config.cors.enabled {
        app = app.layer(cors_layer());
    }
    Ok(app)
}

/// Bind and serve until ctrl-c or SIGTERM
pub async fn serve(config: SwitchboardConfig) -> Result<()> {
    let app = build_app(&config)?;
    let addr = config.bind_address();

    log_config_summary(&config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Switchboard listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn log_config_summary(config: &SwitchboardConfig) {
    tracing::info!("=== Switchboard Configuration ===");
    tracing::info!("Bind Address: {}", config.bind_address());
    tracing::info!("Keepalive: {:?}", config.keepalive_interval);
    tracing::info!(
        "CORS: {}",
        if config.cors.enabled { "Enabled" } else { "Disabled" }
    );
    tracing::info!("Gmail API: {}", config.gmail.base_url);
    tracing::info!("Tenants with credentials: {}", config.credentials.len());
    tracing::info!("=================================");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
