//! In-process backend connector for testing
//!
//! Every successful `connect()` hands the transport-side [`BackendPeer`] to
//! the test through a channel, so tests can script utterances and observe
//! forwarded user messages without a network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BackendConnector, BackendLink, BackendPeer, LINK_CAPACITY};
use crate::error::BackendError;

pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<BackendPeer>,
    unreachable: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector and the receiver of its peers
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            unreachable: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        };
        (connector, rx)
    }

    /// Make subsequent dials fail (or succeed again)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of dials attempted so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for MemoryConnector {
    async fn connect(&self) -> Result<BackendLink, BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BackendError::Handshake("backend unreachable".to_string()));
        }

        let (link, peer) = BackendLink::pair(LINK_CAPACITY);
        self.peers.send(peer).map_err(|_| BackendError::Closed)?;
        Ok(link)
    }
}
