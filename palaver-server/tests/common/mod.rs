//! Shared test utilities for palaver-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use palaver_core::{
    BackendConnector, BackendError, BackendLink, BackendPeer, EnrichError, Enricher, MemoryConnector, NoopEnricher,
    PassthroughTranslator, Pipeline, TranslateError, Translator,
};
use palaver_server::{AppState, PalaverServer, ServerConfig};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound for anything a test waits on
#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(2);

/// A running server whose sessions dial an in-memory backend
#[allow(dead_code)]
pub struct TestRelay {
    pub state: Arc<AppState>,
    pub addr: SocketAddr,
    pub connector: Arc<MemoryConnector>,
    peers: UnboundedReceiver<BackendPeer>,
}

#[allow(dead_code)]
impl TestRelay {
    /// Backend end of the next session to connect
    pub async fn next_peer(&mut self) -> BackendPeer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("timed out waiting for backend dial")
            .expect("connector dropped")
    }

    /// Wait until the registry holds exactly `count` sessions
    pub async fn wait_for_sessions(&self, count: usize) {
        wait_for_sessions(&self.state, count).await;
    }
}

/// Relay with passthrough translation and no enrichment
#[allow(dead_code)]
pub async fn spawn_relay() -> TestRelay {
    spawn_relay_with(Pipeline::new(
        Arc::new(PassthroughTranslator),
        Arc::new(NoopEnricher),
    ))
    .await
}

/// Relay with a custom pipeline
#[allow(dead_code)]
pub async fn spawn_relay_with(pipeline: Pipeline) -> TestRelay {
    let (connector, peers) = MemoryConnector::new();
    let connector = Arc::new(connector);
    let dyn_connector: Arc<dyn BackendConnector> = connector.clone();

    let state = Arc::new(AppState::new(dyn_connector, pipeline));
    let addr = spawn_server(Arc::clone(&state)).await;

    TestRelay {
        state,
        addr,
        connector,
        peers,
    }
}

/// Spawns server in background task, returns bound address
#[allow(dead_code)]
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = PalaverServer::with_state(ServerConfig::new("127.0.0.1", addr.port()), state);
    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}

#[allow(dead_code)]
pub async fn wait_for_sessions(state: &AppState, count: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while state.registry.len().await != count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {} sessions, have {}",
            count,
            state.registry.len().await
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Translator that tags text with its direction, e.g. `[es>en] Hola`
#[allow(dead_code)]
pub struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        Ok(format!("[{}>{}] {}", source, target, text))
    }
}

/// Translator that always fails
#[allow(dead_code)]
pub struct FailingTranslator;

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslateError> {
        Err(TranslateError::EmptyResult)
    }
}

/// Enricher that answers `{link}.jpg` after `delay`
#[allow(dead_code)]
pub struct DelayedEnricher {
    pub delay: Duration,
}

#[async_trait]
impl Enricher for DelayedEnricher {
    async fn image_for(&self, link: &str) -> Result<String, EnrichError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("{}.jpg", link))
    }
}

/// Connector that waits `delay` before dialing the in-memory backend and
/// records whether the dial was abandoned midway
#[allow(dead_code)]
pub struct SlowConnector {
    pub delay: Duration,
    pub inner: MemoryConnector,
    pub started: Arc<AtomicBool>,
    pub abandoned: Arc<AtomicBool>,
    pub completed: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl SlowConnector {
    pub fn new(delay: Duration) -> (Self, UnboundedReceiver<BackendPeer>) {
        let (inner, peers) = MemoryConnector::new();
        let connector = Self {
            delay,
            inner,
            started: Arc::new(AtomicBool::new(false)),
            abandoned: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicBool::new(false)),
        };
        (connector, peers)
    }
}

/// Flags the dial as abandoned when dropped before it finished
struct DialGuard {
    abandoned: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for DialGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BackendConnector for SlowConnector {
    async fn connect(&self) -> Result<BackendLink, BackendError> {
        self.started.store(true, Ordering::SeqCst);
        let mut guard = DialGuard {
            abandoned: Arc::clone(&self.abandoned),
            finished: false,
        };
        tokio::time::sleep(self.delay).await;
        let link = self.inner.connect().await;
        guard.finished = true;
        self.completed.store(true, Ordering::SeqCst);
        link
    }
}

/// Server whose sessions dial through `connector`
#[allow(dead_code)]
pub async fn spawn_relay_over(
    connector: Arc<dyn BackendConnector>,
) -> (Arc<AppState>, SocketAddr) {
    let pipeline = Pipeline::new(Arc::new(PassthroughTranslator), Arc::new(NoopEnricher));
    let state = Arc::new(AppState::new(connector, pipeline));
    let addr = spawn_server(Arc::clone(&state)).await;
    (state, addr)
}
