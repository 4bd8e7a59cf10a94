//! Shared fixtures for the router integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, BodyDataStream},
    http::{Method, Request},
    response::Response,
    Router,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use switchboard_mcp::{
    protocol::JsonRpcRequest, routes, GatewayState, McpError, McpHandler, McpResult,
    ProtocolServer, RoutingKey, ServerFactory, SessionIdGenerator, SessionRegistry,
};

/// Answers `whoami` with the number of the server instance it belongs to
pub struct InstanceHandler {
    instance: usize,
}

#[async_trait]
impl McpHandler for InstanceHandler {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "serverInfo": {"name": "test-server", "version": "0.0.0"}
            })),
            "whoami" => Ok(json!({"instance": self.instance})),
            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }
}

/// Counts instantiations and records the keys it was asked for
#[derive(Default)]
pub struct CountingFactory {
    created: AtomicUsize,
    keys: parking_lot::Mutex<Vec<RoutingKey>>,
}

impl CountingFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<RoutingKey> {
        self.keys.lock().clone()
    }
}

#[async_trait]
impl ServerFactory for CountingFactory {
    async fn create(&self, key: &RoutingKey) -> McpResult<ProtocolServer> {
        let instance = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        self.keys.lock().push(key.clone());
        Ok(ProtocolServer::new(
            key.clone(),
            Arc::new(InstanceHandler { instance }),
        ))
    }
}

/// Fails every instantiation
pub struct FailingFactory;

#[async_trait]
impl ServerFactory for FailingFactory {
    async fn create(&self, key: &RoutingKey) -> McpResult<ProtocolServer> {
        Err(McpError::internal(format!("no server for {}", key)))
    }
}

/// Hands out `session-1`, `session-2`, ...
#[derive(Default)]
pub struct SequentialIds(AtomicUsize);

impl SessionIdGenerator for SequentialIds {
    fn generate(&self) -> String {
        format!("session-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub struct Harness {
    pub app: Router,
    pub registry: Arc<SessionRegistry>,
    pub factory: Arc<CountingFactory>,
}

pub fn harness() -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let factory = Arc::new(CountingFactory::default());
    let state = GatewayState::new(factory.clone())
        .with_registry(Arc::clone(&registry))
        .with_id_generator(Arc::new(SequentialIds::default()))
        .with_keepalive_interval(Duration::from_secs(20));

    Harness {
        app: routes(state),
        registry,
        factory,
    }
}

pub fn failing_app() -> (Router, Arc<SessionRegistry>) {
    let registry = Arc::new(SessionRegistry::new());
    let state = GatewayState::new(Arc::new(FailingFactory))
        .with_registry(Arc::clone(&registry))
        .with_id_generator(Arc::new(SequentialIds::default()));
    (routes(state), registry)
}

pub fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "integration-test", "version": "1.0.0"}
        }
    })
}

pub fn whoami_body(id: u64) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "whoami"})
}

pub fn request(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(value).unwrap())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Next SSE frame from a streaming body
pub async fn next_frame(stream: &mut BodyDataStream) -> String {
    let chunk = stream.next().await.unwrap().unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

/// JSON payload of a `data:` line in an SSE frame
pub fn frame_data(frame: &str) -> Value {
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    serde_json::from_str(data).unwrap()
}
