//! Session registry and correlation index
//!
//! The registry owns every live transport, keyed by session id. Alongside it
//! sits a per-tenant correlation index mapping a client-supplied chat id to
//! the session that serves it. The index is advisory: only the session id in
//! the registry decides where a request goes.

use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

use crate::transport::{TransportHandle, TransportObserver};

/// Process-wide map of live sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, TransportHandle>>,
    correlations: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transport, replacing any previous entry for the id
    pub fn register(&self, session_id: &str, transport: TransportHandle) {
        let previous = self
            .sessions
            .write()
            .insert(session_id.to_string(), transport);
        if previous.is_some() {
            debug!("Replaced existing transport for session {}", session_id);
        }
    }

    pub fn lookup(&self, session_id: &str) -> Option<TransportHandle> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Drop a session and any correlations pointing at it. No-op when absent.
    pub fn remove(&self, session_id: &str) -> Option<TransportHandle> {
        let removed = self.sessions.write().remove(session_id);

        let mut correlations = self.correlations.write();
        correlations.retain(|_, chats| {
            chats.retain(|_, session| session != session_id);
            !chats.is_empty()
        });

        removed
    }

    pub fn record_correlation(&self, tenant_id: &str, correlation_id: &str, session_id: &str) {
        self.correlations
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .insert(correlation_id.to_string(), session_id.to_string());
    }

    pub fn resolve_correlation(&self, tenant_id: &str, correlation_id: &str) -> Option<String> {
        self.correlations
            .read()
            .get(tenant_id)
            .and_then(|chats| chats.get(correlation_id))
            .cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Keeps the registry in step with one transport's lifecycle: registers it
/// when its handshake assigns a session id and removes it when it closes.
pub struct RegistryObserver {
    registry: Arc<SessionRegistry>,
    tenant_id: String,
    correlation_id: Option<String>,
}

impl RegistryObserver {
    pub fn new(
        registry: Arc<SessionRegistry>,
        tenant_id: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            registry,
            tenant_id: tenant_id.into(),
            correlation_id,
        }
    }
}

impl TransportObserver for RegistryObserver {
    fn on_session_initialized(&self, session_id: &str, transport: &TransportHandle) {
        self.registry.register(session_id, Arc::clone(transport));
        if let Some(correlation_id) = &self.correlation_id {
            self.registry
                .record_correlation(&self.tenant_id, correlation_id, session_id);
        }
        info!(
            "Session initialized with ID: {} for tenant: {} chatId: {:?}",
            session_id, self.tenant_id, self.correlation_id
        );
    }

    fn on_close(&self, session_id: Option<&str>) {
        if let Some(session_id) = session_id {
            if self.registry.remove(session_id).is_some() {
                info!(
                    "Session {} closed for tenant: {} ({} active)",
                    session_id,
                    self.tenant_id,
                    self.registry.len()
                );
            }
        }
    }
}
