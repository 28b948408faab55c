//! WebSocket connection handling

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use tracing::{Instrument, error, info, info_span};

use crate::AppState;
use crate::error::SessionError;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    peer: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let peer = peer.map(|ConnectInfo(addr)| addr.to_string());
    ws.on_upgrade(move |socket| {
        let span = info_span!("ws", peer = peer.as_deref().unwrap_or("unknown"));
        handle_socket(socket, state).instrument(span)
    })
}

/// Run one relay session from accept to teardown
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket client connected");

    let session = match state.registry.create(socket, &state.sessions).await {
        Ok(session) => session,
        Err(SessionError::ClientLeft) => {
            info!("WebSocket client left before the backend answered");
            return;
        }
        Err(e) => {
            error!("Failed to establish backend connection: {}", e);
            return;
        }
    };

    let id = session.id();
    info!(session_id = %id, "relay session opened");

    let reason = session.run(&state.registry).await;

    info!(session_id = %id, %reason, "relay session closed");
}
