//! Periodic liveness notifications for open SSE streams

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    protocol::{notification, KEEPALIVE},
    transport::{TransportHandle, TransportObserver},
};

/// Default interval between keepalive frames
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Keepalive timer for one transport.
///
/// Registered as a [`TransportObserver`] when the transport is built so a
/// close event stops it; a failed write stops it and closes the transport.
/// Cancellation happens at most once, whichever path gets there first.
pub struct Keepalive {
    interval: Duration,
    stop: Notify,
    started: AtomicBool,
    cancelled: AtomicBool,
}

impl Keepalive {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            stop: Notify::new(),
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Spawn the timer task. Returns `None` if already started or cancelled.
    pub fn start(self: &Arc<Self>, transport: TransportHandle) -> Option<JoinHandle<()>> {
        if self.is_cancelled() || self.started.swap(true, Ordering::SeqCst) {
            return None;
        }

        let keepalive = Arc::clone(self);
        Some(tokio::spawn(async move {
            keepalive.run(transport).await;
        }))
    }

    async fn run(&self, transport: TransportHandle) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop.notified() => break,
                _ = ticker.tick() => {
                    if self.is_cancelled() {
                        break;
                    }
                    if let Err(e) = transport.send(notification(KEEPALIVE)) {
                        warn!(
                            "Keepalive failed for session {:?}: {}",
                            transport.session_id(),
                            e
                        );
                        self.cancel();
                        transport.close();
                        break;
                    }
                }
            }
        }

        debug!("Keepalive stopped for session {:?}", transport.session_id());
    }

    /// Stop the timer. Returns `true` only for the call that cancelled it.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        // notify_one stores a permit, so a task not yet waiting still sees it
        self.stop.notify_one();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl TransportObserver for Keepalive {
    fn on_close(&self, _session_id: Option<&str>) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::JsonRpcMessage,
        server::ProtocolServer,
        transport::{McpTransport, TransportKind, TransportRequest},
        McpError, McpResult,
    };
    use async_trait::async_trait;
    use axum::response::{IntoResponse, Response};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Records sends; fails every send after `fail_after` successes
    struct RecordingTransport {
        sent: Mutex<Vec<JsonRpcMessage>>,
        fail_after: usize,
        closes: AtomicUsize,
    }

    impl RecordingTransport {
        fn new(fail_after: usize) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail_after,
                closes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl McpTransport for RecordingTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Sse
        }

        fn session_id(&self) -> Option<String> {
            Some("s1".to_string())
        }

        fn attach(&self, _server: Arc<ProtocolServer>) -> McpResult<()> {
            Ok(())
        }

        async fn handle_request(&self, _request: TransportRequest) -> McpResult<Response> {
            Ok(().into_response())
        }

        fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
            let mut sent = self.sent.lock();
            if sent.len() >= self.fail_after {
                return Err(McpError::delivery("peer gone"));
            }
            sent.push(message);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_keepalive_each_interval() {
        let transport = RecordingTransport::new(usize::MAX);
        let keepalive = Keepalive::new(Duration::from_secs(20));
        keepalive.start(transport.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert!(transport.sent.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(42)).await;
        assert_eq!(transport.sent.lock().len(), 3);

        assert!(keepalive.cancel());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.sent.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_cancels_and_closes() {
        let transport = RecordingTransport::new(1);
        let keepalive = Keepalive::new(Duration::from_secs(20));
        let task = keepalive.start(transport.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(45)).await;
        task.await.unwrap();

        assert!(keepalive.is_cancelled());
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent.lock().len(), 1);

        // the close event arriving afterwards does not cancel a second time
        assert!(!keepalive.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_reported_once() {
        let keepalive = Keepalive::new(Duration::from_secs(20));
        assert!(keepalive.cancel());
        assert!(!keepalive.cancel());
        keepalive.on_close(Some("s1"));
        assert!(keepalive.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_runs() {
        let transport = RecordingTransport::new(usize::MAX);
        let keepalive = Keepalive::new(Duration::from_secs(20));
        keepalive.on_close(Some("s1"));

        assert!(keepalive.start(transport.clone()).is_none());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_only_once() {
        let transport = RecordingTransport::new(usize::MAX);
        let keepalive = Keepalive::new(Duration::from_secs(20));

        assert!(keepalive.start(transport.clone()).is_some());
        assert!(keepalive.start(transport.clone()).is_none());
        keepalive.cancel();
    }
}
