//! Relay session: one client socket bridged to one backend connection
//!
//! A session is opened by [`SessionRegistry::create`](crate::SessionRegistry::create)
//! and then driven to completion by [`Session::run`]. Two loops run
//! concurrently inside `run`:
//!
//! - the client loop reads frames, updates the display language and forwards
//!   user messages to the backend in receipt order;
//! - the backend loop turns each utterance into a client frame, one at a
//!   time, so frames leave in the order the backend emitted them.
//!
//! Both loops write through the same [`ClientWriter`]. Whichever loop ends
//! first ends the session; the other is dropped, cancelling any in-flight
//! translation or enrichment, and [`Session::teardown`] releases both sides.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::{self, SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use palaver_core::{
    BackendConnector, BackendError, BackendLink, InboundMessage, Pipeline, StatusMessage,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::registry::SessionRegistry;

/// Language a session starts in
pub const DEFAULT_DISPLAY_LANGUAGE: &str = "en";

/// Opaque session handle, allocated monotonically and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Shared collaborators every session is opened with
#[derive(Clone)]
pub struct SessionContext {
    pub connector: Arc<dyn BackendConnector>,
    pub pipeline: Arc<Pipeline>,
    pub default_language: String,
    /// Server-wide shutdown; every session token is a child of it
    pub shutdown: CancellationToken,
}

impl SessionContext {
    pub fn new(connector: Arc<dyn BackendConnector>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            connector,
            pipeline,
            default_language: DEFAULT_DISPLAY_LANGUAGE.to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }
}

/// The part of a session the registry keeps: its display language and a
/// way to ask it to stop
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    language: Arc<RwLock<String>>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        language: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            language: Arc::new(RwLock::new(language.into())),
            shutdown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current display language
    pub async fn language(&self) -> String {
        self.language.read().await.clone()
    }

    pub async fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        let mut current = self.language.write().await;
        if *current != language {
            debug!(
                session_id = %self.id,
                from = %current.as_str(),
                to = %language,
                "display language changed"
            );
            *current = language;
        }
    }

    /// Ask the session to tear down. Non-blocking and idempotent.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ClientClosed,
    ClientError,
    BackendClosed,
    Shutdown,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Termination::ClientClosed => "client closed",
            Termination::ClientError => "client error",
            Termination::BackendClosed => "backend closed",
            Termination::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// Serializes every write to one client socket
///
/// Closing is idempotent: only the first call sends a close frame.
pub struct ClientWriter<S> {
    sink: Mutex<S>,
    closed: AtomicBool,
}

impl<S> ClientWriter<S>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// Send `msg` as one JSON text frame
    pub async fn send_json<T: Serialize>(&self, msg: &T) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::ClientClosed);
        }
        let json = serde_json::to_string(msg)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| SessionError::Client(e.to_string()))
    }

    /// Send a close frame and close the sink; later calls do nothing
    pub async fn close(&self, frame: Option<CloseFrame<'static>>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sink = self.sink.lock().await;
        // The peer may already be gone; there is nobody left to report to.
        let _ = sink.send(Message::Close(frame)).await;
        let _ = sink.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One client connection bridged to one backend connection
pub struct Session {
    handle: SessionHandle,
    writer: ClientWriter<SplitSink<WebSocket, Message>>,
    /// Client frames received while the backend was being dialed
    pending: VecDeque<Message>,
    reader: SplitStream<WebSocket>,
    backend: BackendLink,
    pipeline: Arc<Pipeline>,
}

impl Session {
    /// Acknowledge the client, then dial the backend
    ///
    /// The client sees `{"status":"Connected"}` before the dial starts. When
    /// the dial fails the client socket is closed and the error returned.
    /// When the client disconnects first, the dial is dropped.
    pub async fn open(
        id: SessionId,
        socket: WebSocket,
        ctx: &SessionContext,
    ) -> Result<Self, SessionError> {
        let (sink, mut reader) = socket.split();
        let writer = ClientWriter::new(sink);

        writer.send_json(&StatusMessage::connected()).await?;

        // Watch the client while dialing: a client that leaves cancels the
        // dial, frames it sends meanwhile are replayed once bridged.
        let mut pending = VecDeque::new();
        let dial = ctx.connector.connect();
        tokio::pin!(dial);
        let dialed = loop {
            tokio::select! {
                result = &mut dial => break result,
                _ = ctx.shutdown.cancelled() => break Err(BackendError::Closed),
                frame = reader.next() => match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        debug!(session_id = %id, "client left during backend dial");
                        writer.close(None).await;
                        return Err(SessionError::ClientLeft);
                    }
                    Some(Ok(message)) => pending.push_back(message),
                },
            }
        };

        let backend = match dialed {
            Ok(backend) => backend,
            Err(e) => {
                writer
                    .close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "backend unavailable".into(),
                    }))
                    .await;
                return Err(e.into());
            }
        };

        Ok(Self {
            handle: SessionHandle::new(
                id,
                ctx.default_language.clone(),
                ctx.shutdown.child_token(),
            ),
            writer,
            pending,
            reader,
            backend,
            pipeline: Arc::clone(&ctx.pipeline),
        })
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Bridge until either side ends, then tear down
    pub async fn run(mut self, registry: &SessionRegistry) -> Termination {
        let reason = self.bridge().await;
        debug!(session_id = %self.id(), %reason, "bridge ended");
        self.teardown(registry).await;
        reason
    }

    async fn bridge(&mut self) -> Termination {
        let Session {
            handle,
            writer,
            pending,
            reader,
            backend,
            pipeline,
        } = self;
        let BackendLink {
            events, outbound, ..
        } = backend;
        let handle: &SessionHandle = handle;
        let writer: &ClientWriter<_> = writer;
        let pipeline: &Pipeline = pipeline;
        let id = handle.id();

        let replay = stream::iter(std::mem::take(pending).into_iter().map(Ok));
        let mut frames = replay.chain(reader);

        let client_loop = async {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let inbound = match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(inbound) => inbound,
                            Err(e) => {
                                warn!(session_id = %id, "dropping malformed client frame: {}", e);
                                continue;
                            }
                        };
                        if let Some(lang) = inbound.lang {
                            handle.set_language(lang).await;
                        }
                        let language = handle.language().await;
                        let message = pipeline.to_backend(&language, &inbound.message).await;
                        if outbound.send(message).await.is_err() {
                            return Termination::BackendClosed;
                        }
                    }
                    Ok(Message::Close(_)) => return Termination::ClientClosed,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(session_id = %id, "client socket error: {}", e);
                        return Termination::ClientError;
                    }
                }
            }
            Termination::ClientClosed
        };

        let backend_loop = async {
            while let Some(utterance) = events.recv().await {
                let language = handle.language().await;
                let message = pipeline.to_client(&language, utterance).await;
                if let Err(e) = writer.send_json(&message).await {
                    debug!(session_id = %id, "failed to deliver utterance: {}", e);
                    return Termination::ClientError;
                }
            }
            Termination::BackendClosed
        };

        tokio::select! {
            reason = client_loop => reason,
            reason = backend_loop => reason,
            _ = handle.shutdown.cancelled() => Termination::Shutdown,
        }
    }

    /// Close the backend link, then the client socket. Idempotent.
    pub async fn close(&self) {
        self.backend.close();
        self.writer
            .close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "session closed".into(),
            }))
            .await;
    }

    /// Release both sides and deregister
    pub async fn teardown(&self, registry: &SessionRegistry) {
        self.close().await;
        registry.remove(self.id()).await;
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_closed() && self.writer.is_closed()
    }
}
