//! SessionRegistry: the set of live relay sessions
//!
//! A session is registered only once its backend dial succeeded and is
//! removed by its own teardown. Identifiers come from a monotonic counter
//! and are never handed out twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::WebSocket;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::SessionError;
use crate::session::{Session, SessionContext, SessionHandle, SessionId};

/// Tracks live sessions by id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Open a session for `socket` and register it
    ///
    /// The client is acknowledged before the backend is dialed. On dial
    /// failure nothing is registered and the client socket is closed.
    #[instrument(name = "session::create", skip_all)]
    pub async fn create(
        &self,
        socket: WebSocket,
        ctx: &SessionContext,
    ) -> Result<Session, SessionError> {
        let id = self.allocate_id();
        let session = Session::open(id, socket, ctx).await?;
        self.insert(session.handle()).await;
        debug!(session_id = %id, "session registered");
        Ok(session)
    }

    pub(crate) async fn insert(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id(), handle);
    }

    /// Update a session's display language; unknown ids are ignored
    pub async fn set_language(&self, id: SessionId, language: impl Into<String>) {
        if let Some(handle) = self.get(id).await {
            handle.set_language(language).await;
        }
    }

    /// Deregister a session. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            debug!(session_id = %id, "session removed");
        }
        removed
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ask every live session to tear down
    pub async fn close_all(&self) {
        for handle in self.sessions.read().await.values() {
            handle.request_shutdown();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
