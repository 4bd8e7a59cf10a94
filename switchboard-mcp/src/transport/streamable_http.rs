//! Streamable HTTP transport implementation for MCP
//!
//! One endpoint carries the whole session: POST delivers JSON-RPC messages
//! and returns their responses (as JSON, or as an SSE stream for clients that
//! only accept `text/event-stream`), GET opens the standalone stream used for
//! server-initiated messages, and DELETE terminates the session.
//!
//! A transport built with a [`SessionIdGenerator`] is stateful: the
//! initialize request assigns the session id, observers are told about it,
//! and every later call must echo it in the `mcp-session-id` header. Without a
//! generator the transport is stateless and accepts any call.

use async_trait::async_trait;
use axum::{
    http::{header::ACCEPT, HeaderMap, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    convert::Infallible,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    notify_closed, McpTransport, SessionIdGenerator, TransportHandle, TransportKind,
    TransportObserver, TransportRequest,
};
use crate::{
    error::{McpError, McpResult},
    keepalive::DEFAULT_KEEPALIVE_INTERVAL,
    protocol::{
        is_initialize_request, JsonRpcMessage, JsonRpcPayload, JsonRpcResponse,
        JSONRPC_VERSION, LAST_EVENT_ID_HEADER, SESSION_ID_HEADER,
    },
    server::ProtocolServer,
};

/// Construction options for [`StreamableHttpTransport`]
#[derive(Clone)]
pub struct StreamableHttpConfig {
    /// Generates the session id at initialization; `None` means stateless
    pub session_id_generator: Option<Arc<dyn SessionIdGenerator>>,

    /// Interval of keep-alive comments on the standalone GET stream
    pub keepalive_interval: Duration,
}

impl StreamableHttpConfig {
    pub fn stateless() -> Self {
        Self {
            session_id_generator: None,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn stateful(generator: Arc<dyn SessionIdGenerator>) -> Self {
        Self {
            session_id_generator: Some(generator),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

impl fmt::Debug for StreamableHttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamableHttpConfig")
            .field("stateful", &self.session_id_generator.is_some())
            .field("keepalive_interval", &self.keepalive_interval)
            .finish()
    }
}

#[derive(Default)]
struct SessionState {
    session_id: Option<String>,
    initialized: bool,
    server: Option<Arc<ProtocolServer>>,
    standalone: Option<mpsc::UnboundedSender<JsonRpcMessage>>,
}

/// Server side of one streamable HTTP session
pub struct StreamableHttpTransport {
    this: Weak<StreamableHttpTransport>,
    config: StreamableHttpConfig,
    observers: Vec<Arc<dyn TransportObserver>>,
    state: Mutex<SessionState>,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    pub fn new(
        config: StreamableHttpConfig,
        observers: Vec<Arc<dyn TransportObserver>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            observers,
            state: Mutex::new(SessionState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_stateful(&self) -> bool {
        self.config.session_id_generator.is_some()
    }

    fn handle(&self) -> Option<TransportHandle> {
        self.this
            .upgrade()
            .map(|transport| transport as TransportHandle)
    }

    async fn handle_post(&self, request: TransportRequest) -> McpResult<Response> {
        let value: Value = serde_json::from_slice(&request.body).map_err(|e| McpError::Parse {
            message: e.to_string(),
        })?;

        let has_initialize = match &value {
            Value::Array(items) => items.iter().any(is_initialize_request),
            other => is_initialize_request(other),
        };

        let payload: JsonRpcPayload = serde_json::from_value(value)
            .map_err(|e| McpError::protocol(format!("Invalid Request: {}", e)))?;
        let (messages, batch) = payload.into_messages();

        if messages.is_empty() {
            return Err(McpError::protocol("Invalid Request: empty batch"));
        }
        if messages.iter().any(|m| m.version() != JSONRPC_VERSION) {
            return Err(McpError::protocol(
                "Invalid Request: jsonrpc version must be \"2.0\"",
            ));
        }

        if has_initialize {
            if messages.len() > 1 {
                return Err(McpError::protocol(
                    "Invalid Request: Only one initialization request is allowed",
                ));
            }
            self.initialize_session()?;
        } else {
            self.validate_session(&request)?;
        }

        let server = self
            .state
            .lock()
            .server
            .clone()
            .ok_or_else(|| McpError::internal("Transport is not connected to a server"))?;

        let mut responses = Vec::new();
        for message in messages {
            if let Some(response) = server.dispatch(message).await {
                responses.push(response);
            }
        }

        let response = if responses.is_empty() {
            StatusCode::ACCEPTED.into_response()
        } else if wants_event_stream(&request.headers) {
            event_stream_response(responses)
        } else if batch {
            Json(responses).into_response()
        } else {
            Json(responses.remove(0)).into_response()
        };

        Ok(with_session_header(response, self.session_id()))
    }

    /// Assign the session id and tell observers, before the server answers
    fn initialize_session(&self) -> McpResult<()> {
        let session_id = {
            let mut state = self.state.lock();
            if state.initialized && state.session_id.is_some() {
                return Err(McpError::protocol(
                    "Invalid Request: Server already initialized",
                ));
            }
            let session_id = self
                .config
                .session_id_generator
                .as_ref()
                .map(|generator| generator.generate());
            state.session_id = session_id.clone();
            state.initialized = true;
            session_id
        };

        if let (Some(session_id), Some(handle)) = (session_id, self.handle()) {
            for observer in &self.observers {
                observer.on_session_initialized(&session_id, &handle);
            }
        }
        Ok(())
    }

    fn validate_session(&self, request: &TransportRequest) -> McpResult<()> {
        if !self.is_stateful() {
            return Ok(());
        }

        let state = self.state.lock();
        if !state.initialized {
            return Err(McpError::session("Bad Request: Server not initialized"));
        }

        match (request.session_id(), state.session_id.as_deref()) {
            (None, _) => Err(McpError::session(
                "Bad Request: Mcp-Session-Id header is required",
            )),
            (Some(received), Some(expected)) if received == expected => Ok(()),
            (Some(received), _) => Err(McpError::SessionNotFound {
                session_id: received.to_string(),
            }),
        }
    }

    fn handle_get(&self, request: &TransportRequest) -> McpResult<Response> {
        if !self.is_stateful() {
            return Err(McpError::MethodNotAllowed {
                method: Method::GET.to_string(),
            });
        }
        self.validate_session(request)?;

        if let Some(last_event_id) = request.header(LAST_EVENT_ID_HEADER) {
            debug!(
                "Last-Event-ID {} received; replay is not supported",
                last_event_id
            );
        }

        let mut receiver = {
            let mut state = self.state.lock();
            if state
                .standalone
                .as_ref()
                .is_some_and(|sender| !sender.is_closed())
            {
                return Err(McpError::Conflict {
                    message: "Conflict: Only one SSE stream is allowed per session".to_string(),
                });
            }
            let (sender, receiver) = mpsc::unbounded_channel();
            state.standalone = Some(sender);
            receiver
        };

        let guard = StandaloneStreamGuard(self.this.clone());
        let stream = async_stream::stream! {
            let _guard = guard;
            while let Some(message) = receiver.recv().await {
                match Event::default().event("message").json_data(&message) {
                    Ok(event) => yield Ok::<Event, Infallible>(event),
                    Err(e) => warn!("Failed to encode server message: {}", e),
                }
            }
        };

        let response = Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(self.config.keepalive_interval))
            .into_response();
        Ok(with_session_header(response, self.session_id()))
    }

    fn handle_delete(&self, request: &TransportRequest) -> McpResult<Response> {
        if !self.is_stateful() {
            return Err(McpError::MethodNotAllowed {
                method: Method::DELETE.to_string(),
            });
        }
        self.validate_session(request)?;
        self.close();
        Ok(StatusCode::OK.into_response())
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Streamable
    }

    fn session_id(&self) -> Option<String> {
        self.state.lock().session_id.clone()
    }

    fn attach(&self, server: Arc<ProtocolServer>) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::transport_setup("Transport is closed"));
        }
        let mut state = self.state.lock();
        if state.server.is_some() {
            return Err(McpError::transport_setup(
                "Transport is already connected to a server",
            ));
        }
        state.server = Some(server);
        Ok(())
    }

    async fn handle_request(&self, request: TransportRequest) -> McpResult<Response> {
        if self.is_closed() {
            return Err(McpError::SessionNotFound {
                session_id: request.session_id().unwrap_or_default().to_string(),
            });
        }

        let method = request.method.clone();
        match method {
            Method::POST => self.handle_post(request).await,
            Method::GET => self.handle_get(&request),
            Method::DELETE => self.handle_delete(&request),
            other => Err(McpError::MethodNotAllowed {
                method: other.to_string(),
            }),
        }
    }

    fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::delivery("Transport is closed"));
        }
        let state = self.state.lock();
        let sender = state.standalone.as_ref().ok_or_else(|| {
            McpError::delivery("No open stream for server-initiated messages")
        })?;
        sender
            .send(message)
            .map_err(|_| McpError::delivery("Client stream disconnected"))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let session_id = {
            let mut state = self.state.lock();
            state.standalone = None;
            state.server = None;
            state.session_id.clone()
        };

        match &session_id {
            Some(id) => info!("Streamable HTTP session {} closed", id),
            None => debug!("Stateless streamable HTTP transport closed"),
        }
        notify_closed(&self.observers, session_id.as_deref());
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Frees the standalone stream slot when the client drops the GET stream
struct StandaloneStreamGuard(Weak<StreamableHttpTransport>);

impl Drop for StandaloneStreamGuard {
    fn drop(&mut self) {
        if let Some(transport) = self.0.upgrade() {
            transport.state.lock().standalone = None;
            debug!(
                "Standalone stream closed for session {:?}",
                transport.session_id()
            );
        }
    }
}

/// Client accepts an event stream but not plain JSON
fn wants_event_stream(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    accept.contains("text/event-stream") && !accept.contains("application/json")
}

fn event_stream_response(responses: Vec<JsonRpcResponse>) -> Response {
    let events: Vec<Result<Event, Infallible>> = responses
        .iter()
        .filter_map(|response| {
            Event::default()
                .event("message")
                .json_data(response)
                .map_err(|e| warn!("Failed to encode response: {}", e))
                .ok()
        })
        .map(Ok)
        .collect();
    Sse::new(futures_util::stream::iter(events)).into_response()
}

fn with_session_header(mut response: Response, session_id: Option<String>) -> Response {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}
