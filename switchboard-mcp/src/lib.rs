//! # Switchboard MCP: multi-tenant session routing
//!
//! Serves the Model Context Protocol over HTTP to many tenants at once. Each
//! call is routed by tenant (and optionally app) to a protocol server built
//! for that key, over one of two transports:
//!
//! - **SSE**: `GET /{tenant}` opens an event stream; the client POSTs its
//!   messages to the endpoint announced in the first event.
//! - **Streamable HTTP**: `POST /v1/{tenant}` starts a session with an
//!   `initialize` request and continues it with the `mcp-session-id` header;
//!   `POST /v1/{tenant}/{app}` serves one-shot stateless calls.
//!
//! Live sessions are kept in a [`SessionRegistry`]. Transports report their
//! lifecycle to [`TransportObserver`]s, which keep the registry current and
//! stop keepalive timers when a connection goes away.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_mcp::{
//!     routes, GatewayState, InMemoryToolRegistry, ListMessagesTool, StaticCredentials,
//!     ToolServerFactory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tools = InMemoryToolRegistry::new();
//!     tools.register_tool(Arc::new(ListMessagesTool::new("https://gmail.googleapis.com")?));
//!
//!     let credentials = StaticCredentials::default().with_token("tenant-1", "gmail", "ya29...");
//!     let factory = ToolServerFactory::new(tools, Arc::new(credentials));
//!     let app = routes(GatewayState::new(Arc::new(factory)));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3010").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod keepalive;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::SwitchboardConfig;
pub use error::{McpError, McpResult};
pub use keepalive::{Keepalive, DEFAULT_KEEPALIVE_INTERVAL};
pub use protocol::is_initialize_request;
pub use router::{routes, GatewayState};
pub use server::{McpHandler, ProtocolServer, RoutingKey, ServerFactory, ToolServer, ToolServerFactory};
pub use session::{RegistryObserver, SessionRegistry};
pub use tools::{
    CredentialStore, InMemoryToolRegistry, ListMessagesTool, McpTool, StaticCredentials,
    ToolExecutionContext, ToolRegistry,
};
pub use transport::{
    McpTransport, SessionIdGenerator, SseTransport, StreamableHttpConfig,
    StreamableHttpTransport, TransportHandle, TransportKind, TransportObserver,
    TransportRequest, UuidSessionIdGenerator,
};
