//! Dialogue backend gateway client
//!
//! A connected backend is exposed to a session as a [`BackendLink`]: an
//! ordered channel of utterance events, a channel for user messages, and a
//! shutdown token. Transport details stay behind [`BackendConnector`].

pub mod memory;
pub mod packet;
pub mod socketio;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::message::{UserMessage, Utterance};

pub use memory::MemoryConnector;
pub use socketio::{SocketIoConfig, SocketIoConnector};

/// Buffered utterances/user messages per link
pub const LINK_CAPACITY: usize = 64;

/// Dials the dialogue backend, one connection per session
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Establish a new backend connection
    ///
    /// Fails when the backend is unreachable or refuses the handshake.
    /// Implementations bound the dial with their own timeout.
    async fn connect(&self) -> Result<BackendLink, BackendError>;
}

/// Session-side end of a backend connection
pub struct BackendLink {
    /// Utterance events in the order the backend emitted them.
    /// Yields `None` once the backend connection is gone.
    pub events: mpsc::Receiver<Utterance>,
    /// User messages to forward to the backend
    pub outbound: mpsc::Sender<UserMessage>,
    shutdown: CancellationToken,
}

impl BackendLink {
    pub fn new(
        events: mpsc::Receiver<Utterance>,
        outbound: mpsc::Sender<UserMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            outbound,
            shutdown,
        }
    }

    /// Create a connected link and the peer end that drives it
    pub fn pair(capacity: usize) -> (BackendLink, BackendPeer) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        let link = BackendLink::new(event_rx, outbound_tx, shutdown.clone());
        let peer = BackendPeer {
            events: event_tx,
            outbound: outbound_rx,
            shutdown,
        };
        (link, peer)
    }

    /// Ask the transport to disconnect. Idempotent and non-blocking.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Transport-side end of a [`BackendLink`]
pub struct BackendPeer {
    pub events: mpsc::Sender<Utterance>,
    pub outbound: mpsc::Receiver<UserMessage>,
    pub shutdown: CancellationToken,
}

impl BackendPeer {
    /// Deliver an utterance to the session; `false` once the session is gone
    pub async fn emit(&self, utterance: Utterance) -> bool {
        self.events.send(utterance).await.is_ok()
    }

    /// Next user message forwarded by the session
    pub async fn recv(&mut self) -> Option<UserMessage> {
        self.outbound.recv().await
    }

    /// Resolves once the session has asked for disconnection
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
