//! Server-Sent Events transport for MCP
//!
//! The client opens a long-lived GET stream; the first event names the
//! endpoint where it POSTs its JSON-RPC messages, and every answer or
//! server-initiated message comes back down the stream as a `message` event.

use async_trait::async_trait;
use axum::{
    http::{Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use parking_lot::Mutex;
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    notify_closed, McpTransport, TransportKind, TransportObserver, TransportRequest,
};
use crate::{
    error::{McpError, McpResult},
    protocol::{JsonRpcMessage, JsonRpcPayload},
    server::ProtocolServer,
};

/// Server side of one SSE connection
pub struct SseTransport {
    this: Weak<SseTransport>,
    session_id: String,
    endpoint: String,
    observers: Vec<Arc<dyn TransportObserver>>,
    sender: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<JsonRpcMessage>>>,
    server: Mutex<Option<Arc<ProtocolServer>>>,
    closed: AtomicBool,
}

impl SseTransport {
    /// Create a transport whose clients POST to `message_path?sessionId=…`
    pub fn new(
        session_id: impl Into<String>,
        message_path: &str,
        observers: Vec<Arc<dyn TransportObserver>>,
    ) -> Arc<Self> {
        let session_id = session_id.into();
        let endpoint = format!("{}?sessionId={}", message_path, session_id);
        let (sender, receiver) = mpsc::unbounded_channel();

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            session_id,
            endpoint,
            observers,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            server: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Where the client should POST its messages
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Take the event stream as an HTTP response. Only one stream per transport.
    ///
    /// Dropping the response body (client disconnect) closes the transport.
    pub fn sse_response(&self) -> McpResult<Response> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| McpError::transport_setup("SSE stream already started"))?;

        let endpoint = self.endpoint.clone();
        let guard = CloseOnDisconnect(self.this.clone());
        let stream = async_stream::stream! {
            let _guard = guard;
            yield Ok::<Event, Infallible>(Event::default().event("endpoint").data(endpoint));

            while let Some(message) = receiver.recv().await {
                match Event::default().event("message").json_data(&message) {
                    Ok(event) => yield Ok(event),
                    Err(e) => warn!("Failed to encode SSE message: {}", e),
                }
            }
        };

        Ok(Sse::new(stream).into_response())
    }

    async fn handle_post(&self, request: TransportRequest) -> McpResult<Response> {
        let payload: JsonRpcPayload =
            serde_json::from_slice(&request.body).map_err(|e| McpError::Parse {
                message: e.to_string(),
            })?;

        let server = self
            .server
            .lock()
            .clone()
            .ok_or_else(|| McpError::delivery("SSE connection not established"))?;

        let (messages, _) = payload.into_messages();
        for message in messages {
            if let Some(response) = server.dispatch(message).await {
                self.send(JsonRpcMessage::Response(response))?;
            }
        }

        Ok((StatusCode::ACCEPTED, "Accepted").into_response())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn attach(&self, server: Arc<ProtocolServer>) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::transport_setup("Transport is closed"));
        }
        let mut slot = self.server.lock();
        if slot.is_some() {
            return Err(McpError::transport_setup(
                "Transport is already connected to a server",
            ));
        }
        *slot = Some(server);
        Ok(())
    }

    async fn handle_request(&self, request: TransportRequest) -> McpResult<Response> {
        if self.is_closed() {
            return Err(McpError::SessionNotFound {
                session_id: self.session_id.clone(),
            });
        }

        let method = request.method.clone();
        match method {
            Method::POST => self.handle_post(request).await,
            Method::GET => Err(McpError::Conflict {
                message: "Conflict: SSE stream already open for this session".to_string(),
            }),
            Method::DELETE => {
                self.close();
                Ok(StatusCode::OK.into_response())
            }
            other => Err(McpError::MethodNotAllowed {
                method: other.to_string(),
            }),
        }
    }

    fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| McpError::delivery("SSE connection closed"))?;
        sender
            .send(message)
            .map_err(|_| McpError::delivery("SSE client disconnected"))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // dropping the sender ends the event stream
        self.sender.lock().take();
        self.server.lock().take();

        info!("SSE connection closed for session {}", self.session_id);
        notify_closed(&self.observers, Some(&self.session_id));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CloseOnDisconnect(Weak<SseTransport>);

impl Drop for CloseOnDisconnect {
    fn drop(&mut self) {
        if let Some(transport) = self.0.upgrade() {
            debug!("SSE stream dropped for session {}", transport.session_id);
            transport.close();
        }
    }
}
