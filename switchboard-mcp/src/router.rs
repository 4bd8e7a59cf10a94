//! HTTP request router
//!
//! Maps each inbound call to a routing key and a session, creating
//! transports and protocol servers for new sessions and forwarding the raw
//! request into the transport that owns the session.
//!
//! | Method | Path | Behaviour |
//! |---|---|---|
//! | GET | `/` | liveness |
//! | POST | `/v1/{tenant}/{app}` | stateless call, fresh server per request |
//! | POST | `/v1/{tenant}` | initialize a session or continue one |
//! | GET, DELETE | `/v1/{tenant}` | open the push stream / end the session |
//! | GET | `/{tenant}` | new SSE session |
//! | POST | `/{tenant}/messages` | message for an SSE session |

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

use crate::{
    error::{McpError, McpResult},
    keepalive::{Keepalive, DEFAULT_KEEPALIVE_INTERVAL},
    protocol::{
        is_initialize_request, notification, CHAT_ID_HEADER, CONNECTION_ESTABLISHED,
        LAST_EVENT_ID_HEADER, SESSION_ID_HEADER,
    },
    server::{ProtocolServer, RoutingKey, ServerFactory},
    session::{RegistryObserver, SessionRegistry},
    transport::{
        McpTransport, SessionIdGenerator, SseTransport, StreamableHttpConfig,
        StreamableHttpTransport, TransportHandle, TransportKind, TransportObserver,
        TransportRequest, UuidSessionIdGenerator,
    },
};

const INVALID_SESSION: &str = "Invalid or missing session ID";

/// Shared state of the routing layer
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub factory: Arc<dyn ServerFactory>,
    pub id_generator: Arc<dyn SessionIdGenerator>,
    pub keepalive_interval: Duration,
}

impl GatewayState {
    pub fn new(factory: Arc<dyn ServerFactory>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            factory,
            id_generator: Arc::new(UuidSessionIdGenerator),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_id_generator(mut self, generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    async fn create_server(&self, key: &RoutingKey) -> McpResult<Arc<ProtocolServer>> {
        let server = self
            .factory
            .create(key)
            .await
            .map_err(|e| McpError::transport_setup(format!("server factory for {}: {}", key, e)))?;
        Ok(Arc::new(server))
    }

    fn streamable_config(&self) -> StreamableHttpConfig {
        StreamableHttpConfig::stateless().with_keepalive_interval(self.keepalive_interval)
    }

    /// Live transport for the id, provided it speaks the route's wire style
    fn resolve(&self, kind: TransportKind, session_id: Option<&str>) -> Option<TransportHandle> {
        let transport = self.registry.lookup(session_id?)?;
        if transport.kind() != kind {
            debug!(
                "Session {:?} is a {} session, not {}",
                session_id,
                transport.kind(),
                kind
            );
            return None;
        }
        Some(transport)
    }
}

/// Build the gateway routes
pub fn routes(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v1/{tenant}/{app}", any(stateless_call))
        .route(
            "/v1/{tenant}",
            post(session_post).get(session_get).delete(session_delete),
        )
        .route("/{tenant}", get(open_sse_stream))
        .route("/{tenant}/messages", post(sse_message))
        .with_state(state)
}

async fn root() -> &'static str {
    debug!("Hello World");
    "Hello World"
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Turn a transport result into the HTTP response, logging server faults
fn finish(result: McpResult<Response>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!("Error handling MCP request: {}", e);
            } else {
                debug!("Rejected MCP request: {}", e);
            }
            e.into_response()
        }
    }
}

fn invalid_session() -> Response {
    (StatusCode::BAD_REQUEST, INVALID_SESSION).into_response()
}

async fn stateless_call(
    State(state): State<GatewayState>,
    Path((tenant, app)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return McpError::MethodNotAllowed {
            method: method.to_string(),
        }
        .into_response();
    }

    let key = RoutingKey::app(tenant, app);
    debug!("Received stateless MCP request for {}", key);
    finish(run_stateless(&state, &key, TransportRequest::new(method, headers, body)).await)
}

async fn run_stateless(
    state: &GatewayState,
    key: &RoutingKey,
    request: TransportRequest,
) -> McpResult<Response> {
    let server = state.create_server(key).await?;
    let transport = StreamableHttpTransport::new(state.streamable_config(), Vec::new());
    server.connect(transport.as_ref())?;

    let response = transport.handle_request(request).await;
    transport.close();
    response
}

async fn session_post(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = header(&headers, SESSION_ID_HEADER).map(str::to_string);
    let chat_id = header(&headers, CHAT_ID_HEADER).map(str::to_string);

    if let Some(transport) = state.resolve(TransportKind::Streamable, session_id.as_deref())
    {
        info!(
            "Session resumed with ID: {:?} for tenant: {} chatId: {:?}",
            session_id, tenant, chat_id
        );
        let request = TransportRequest::new(Method::POST, headers, body);
        return finish(transport.handle_request(request).await);
    }

    if session_id.is_none() && body_is_initialize(&body) {
        let request = TransportRequest::new(Method::POST, headers, body);
        return finish(start_session(&state, &tenant, chat_id, request).await);
    }

    McpError::session("Bad Request: No valid session ID provided").into_response()
}

fn body_is_initialize(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .map(|value| is_initialize_request(&value))
        .unwrap_or(false)
}

async fn start_session(
    state: &GatewayState,
    tenant: &str,
    chat_id: Option<String>,
    request: TransportRequest,
) -> McpResult<Response> {
    let server = state.create_server(&RoutingKey::tenant(tenant)).await?;

    let observer: Arc<dyn TransportObserver> = Arc::new(RegistryObserver::new(
        Arc::clone(&state.registry),
        tenant,
        chat_id,
    ));
    let config = StreamableHttpConfig::stateful(Arc::clone(&state.id_generator))
        .with_keepalive_interval(state.keepalive_interval);
    let transport = StreamableHttpTransport::new(config, vec![observer]);

    server.connect(transport.as_ref())?;
    transport.handle_request(request).await
}

async fn session_get(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session_id = header(&headers, SESSION_ID_HEADER);
    let Some(transport) = state.resolve(TransportKind::Streamable, session_id) else {
        return invalid_session();
    };

    match header(&headers, LAST_EVENT_ID_HEADER) {
        Some(last_event_id) => info!(
            "Client reconnecting with Last-Event-ID: {} (tenant: {})",
            last_event_id, tenant
        ),
        None => info!(
            "Establishing new SSE stream for session {:?} (tenant: {})",
            transport.session_id(),
            tenant
        ),
    }

    let request = TransportRequest::new(Method::GET, headers, Bytes::new());
    finish(transport.handle_request(request).await)
}

async fn session_delete(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session_id = header(&headers, SESSION_ID_HEADER);
    let Some(transport) = state.resolve(TransportKind::Streamable, session_id) else {
        return invalid_session();
    };

    info!(
        "Terminating session {:?} for tenant: {}",
        transport.session_id(),
        tenant
    );
    let request = TransportRequest::new(Method::DELETE, headers, Bytes::new());
    match transport.handle_request(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Error handling session termination: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error processing session termination",
            )
                .into_response()
        }
    }
}

async fn open_sse_stream(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
) -> Response {
    match establish_sse(&state, &tenant).await {
        Ok(response) => response,
        Err(e) => {
            error!("Error establishing SSE connection for {}: {}", tenant, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to establish SSE connection: {}", e),
            )
                .into_response()
        }
    }
}

async fn establish_sse(state: &GatewayState, tenant: &str) -> McpResult<Response> {
    let server = state.create_server(&RoutingKey::tenant(tenant)).await?;

    let session_id = state.id_generator.generate();
    let keepalive = Keepalive::new(state.keepalive_interval);
    let cleanup: Arc<dyn TransportObserver> = Arc::new(RegistryObserver::new(
        Arc::clone(&state.registry),
        tenant,
        None,
    ));
    let stop_keepalive: Arc<dyn TransportObserver> = keepalive.clone();
    let sse = SseTransport::new(
        session_id,
        &format!("/{}/messages", tenant),
        vec![cleanup, stop_keepalive],
    );

    activate_sse(state, tenant, &server, sse, &keepalive)
}

/// Connect the server and open the stream. The session is registered only
/// once the stream is live; on failure the transport is closed unregistered.
fn activate_sse(
    state: &GatewayState,
    tenant: &str,
    server: &Arc<ProtocolServer>,
    sse: Arc<SseTransport>,
    keepalive: &Arc<Keepalive>,
) -> McpResult<Response> {
    match connect_sse(server, &sse) {
        Ok(response) => {
            let session_id = sse.session_id().unwrap_or_default();
            let transport: TransportHandle = sse;
            state.registry.register(&session_id, Arc::clone(&transport));
            keepalive.start(transport);
            info!(
                "SSE connection established for tenant: {} session: {} ({} active)",
                tenant,
                session_id,
                state.registry.len()
            );
            Ok(response)
        }
        Err(e) => {
            sse.close();
            Err(e)
        }
    }
}

fn connect_sse(server: &Arc<ProtocolServer>, sse: &SseTransport) -> McpResult<Response> {
    server.connect(sse)?;
    let response = sse.sse_response()?;
    sse.send(notification(CONNECTION_ESTABLISHED))?;
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn sse_message(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = query
        .session_id
        .as_deref()
        .or_else(|| header(&headers, SESSION_ID_HEADER));
    let Some(transport) = state.resolve(TransportKind::Sse, session_id) else {
        return invalid_session();
    };

    debug!("Message for SSE session {:?} (tenant: {})", session_id, tenant);
    let request = TransportRequest::new(Method::POST, headers, body);
    finish(transport.handle_request(request).await)
}
