//! Socket.IO connector for the dialogue backend
//!
//! Each connection is a WebSocket speaking Engine.IO v4. After the
//! handshake a driver task owns the socket: it answers pings, turns
//! utterance events into [`Utterance`]s and encodes outgoing
//! [`UserMessage`]s, until either side disconnects.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::packet::{DEFAULT_NAMESPACE, EnginePacket, Handshake, SocketPacket};
use super::{BackendConnector, BackendLink, LINK_CAPACITY};
use crate::error::BackendError;
use crate::message::{UserMessage, Utterance};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default backend address (the dialogue server's Socket.IO channel)
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5005/";
pub const DEFAULT_SOCKETIO_PATH: &str = "socket.io";
pub const DEFAULT_UTTERANCE_EVENT: &str = "bot_uttered";
pub const DEFAULT_USER_MESSAGE_EVENT: &str = "user_uttered";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Used when the server does not announce its ping schedule
const FALLBACK_LIVENESS: Duration = Duration::from_secs(60);

/// Where and how to reach the backend
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    /// Base URL of the backend (`http`, `https`, `ws` or `wss`)
    pub url: String,
    /// Path of the Socket.IO endpoint on that host
    pub socketio_path: String,
    /// Event carrying backend utterances
    pub utterance_event: String,
    /// Event user messages are emitted as
    pub user_message_event: String,
    /// Upper bound for connecting plus handshake
    pub connect_timeout: Duration,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            socketio_path: DEFAULT_SOCKETIO_PATH.to_string(),
            utterance_event: DEFAULT_UTTERANCE_EVENT.to_string(),
            user_message_event: DEFAULT_USER_MESSAGE_EVENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SocketIoConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// WebSocket URL of the Engine.IO endpoint, e.g.
    /// `ws://localhost:5005/socket.io/?EIO=4&transport=websocket`
    pub fn socket_url(&self) -> Result<Url, BackendError> {
        let mut url =
            Url::parse(&self.url).map_err(|e| BackendError::InvalidUrl(format!("{}: {}", self.url, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(BackendError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| BackendError::InvalidUrl(self.url.clone()))?;

        let path = self.socketio_path.trim_matches('/');
        url.set_path(&format!("/{}/", path));
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url)
    }
}

/// Dials the backend over Socket.IO
#[derive(Debug, Clone, Default)]
pub struct SocketIoConnector {
    config: SocketIoConfig,
}

impl SocketIoConnector {
    pub fn new(config: SocketIoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SocketIoConfig {
        &self.config
    }
}

#[async_trait]
impl BackendConnector for SocketIoConnector {
    #[instrument(name = "backend::dial", skip(self), fields(url = %self.config.url))]
    async fn connect(&self) -> Result<BackendLink, BackendError> {
        let url = self.config.socket_url()?;
        let timeout = self.config.connect_timeout;

        let (ws, handshake) = tokio::time::timeout(timeout, dial(&url))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;

        debug!(sid = %handshake.sid, "backend connected");

        let (event_tx, event_rx) = mpsc::channel(LINK_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(LINK_CAPACITY);
        let shutdown = CancellationToken::new();

        let driver = Driver {
            utterance_event: self.config.utterance_event.clone(),
            user_message_event: self.config.user_message_event.clone(),
            liveness: liveness_window(&handshake),
            events: event_tx,
            outbound: outbound_rx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(driver.run(ws));

        Ok(BackendLink::new(event_rx, outbound_tx, shutdown))
    }
}

/// Open the WebSocket and complete the Engine.IO and Socket.IO handshakes
async fn dial(url: &Url) -> Result<(WsStream, Handshake), BackendError> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;

    let handshake = match EnginePacket::decode(&next_text(&mut ws).await?)? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(BackendError::Handshake(format!(
                "expected open packet, got {:?}",
                other
            )));
        }
    };

    ws.send(Message::Text(SocketPacket::connect().into_frame().into()))
        .await?;

    loop {
        match EnginePacket::decode(&next_text(&mut ws).await?)? {
            EnginePacket::Ping(data) => {
                ws.send(Message::Text(EnginePacket::Pong(data).encode().into()))
                    .await?;
            }
            EnginePacket::Message(data) => match SocketPacket::decode(&data)? {
                SocketPacket::Connect { .. } => return Ok((ws, handshake)),
                SocketPacket::ConnectError { payload, .. } => {
                    return Err(BackendError::Handshake(format!(
                        "connection refused: {}",
                        payload.unwrap_or(Value::Null)
                    )));
                }
                _ => continue,
            },
            EnginePacket::Close => return Err(BackendError::Closed),
            _ => continue,
        }
    }
}

async fn next_text(ws: &mut WsStream) -> Result<String, BackendError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
            Some(Ok(Message::Close(_))) | None => return Err(BackendError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// How long the connection may stay silent before it is considered dead
fn liveness_window(handshake: &Handshake) -> Duration {
    let window = handshake.ping_interval + handshake.ping_timeout;
    if window == 0 {
        FALLBACK_LIVENESS
    } else {
        Duration::from_millis(window)
    }
}

/// What one inbound frame means to the driver
#[derive(Debug, PartialEq)]
enum Incoming {
    Ping(String),
    Utterance(Utterance),
    Closed,
    Ignored,
}

/// Owns the backend socket after the handshake
struct Driver {
    utterance_event: String,
    user_message_event: String,
    liveness: Duration,
    events: mpsc::Sender<Utterance>,
    outbound: mpsc::Receiver<UserMessage>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self, ws: WsStream) {
        let (mut sink, mut stream) = ws.split();
        let silence = tokio::time::sleep(self.liveness);
        tokio::pin!(silence);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let goodbye = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    let _ = sink.send(Message::Text(goodbye.into_frame().into())).await;
                    let _ = sink.close().await;
                    debug!("backend disconnect requested");
                    break;
                }

                _ = &mut silence => {
                    warn!("backend missed its ping deadline");
                    break;
                }

                msg = self.outbound.recv() => {
                    let Some(msg) = msg else {
                        let _ = sink.close().await;
                        break;
                    };
                    let data = match serde_json::to_value(&msg) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!("failed to encode user message: {}", e);
                            continue;
                        }
                    };
                    let frame = SocketPacket::event(self.user_message_event.clone(), data).into_frame();
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!("failed to send user message to backend: {}", e);
                        break;
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        silence.as_mut().reset(Instant::now() + self.liveness);
                        match self.classify(&text) {
                            Incoming::Ping(data) => {
                                let pong = EnginePacket::Pong(data).encode();
                                if sink.send(Message::Text(pong.into())).await.is_err() {
                                    break;
                                }
                            }
                            Incoming::Utterance(utterance) => {
                                if self.events.send(utterance).await.is_err() {
                                    break;
                                }
                            }
                            Incoming::Closed => {
                                debug!("backend closed the connection");
                                break;
                            }
                            Incoming::Ignored => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("backend socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("backend socket error: {}", e);
                        break;
                    }
                },
            }
        }

        // Marks the link closed for the session; the event sender drops here.
        self.shutdown.cancel();
    }

    fn classify(&self, frame: &str) -> Incoming {
        let packet = match EnginePacket::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("skipping malformed backend frame: {}", e);
                return Incoming::Ignored;
            }
        };

        let data = match packet {
            EnginePacket::Ping(data) => return Incoming::Ping(data),
            EnginePacket::Close => return Incoming::Closed,
            EnginePacket::Message(data) => data,
            _ => return Incoming::Ignored,
        };

        match SocketPacket::decode(&data) {
            Ok(SocketPacket::Event {
                namespace,
                name,
                args,
                ..
            }) if namespace == DEFAULT_NAMESPACE && name == self.utterance_event => {
                let payload = args.into_iter().next().unwrap_or(Value::Null);
                match serde_json::from_value(payload) {
                    Ok(utterance) => Incoming::Utterance(utterance),
                    Err(e) => {
                        warn!("skipping malformed utterance: {}", e);
                        Incoming::Ignored
                    }
                }
            }
            Ok(SocketPacket::Disconnect { namespace }) if namespace == DEFAULT_NAMESPACE => {
                Incoming::Closed
            }
            Ok(_) => Incoming::Ignored,
            Err(e) => {
                warn!("skipping malformed backend packet: {}", e);
                Incoming::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    type ServerWs = WebSocketStream<TcpStream>;

    const OPEN: &str = r#"0{"sid":"eio-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    /// Serve one WebSocket connection with `script`, return the backend base URL
    async fn fake_backend<F, Fut>(script: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            script(ws).await;
        });
        format!("http://{}/", addr)
    }

    async fn recv_text(ws: &mut ServerWs) -> Option<String> {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn send_text(ws: &mut ServerWs, text: &str) {
        ws.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    /// Server half of the handshake
    async fn accept_handshake(ws: &mut ServerWs) {
        send_text(ws, OPEN).await;
        assert_eq!(recv_text(ws).await.as_deref(), Some("40"));
        send_text(ws, r#"40{"sid":"sio-sid"}"#).await;
    }

    fn connector(url: String) -> SocketIoConnector {
        SocketIoConnector::new(SocketIoConfig {
            connect_timeout: Duration::from_secs(2),
            ..SocketIoConfig::new(url)
        })
    }

    // ==================== URL ====================

    #[test]
    fn socket_url_from_http_base() {
        let url = SocketIoConfig::new("http://rasa:5005/").socket_url().unwrap();
        assert_eq!(
            url.as_str(),
            "ws://rasa:5005/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_url_from_https_base_with_custom_path() {
        let config = SocketIoConfig {
            socketio_path: "/bot/socket.io/".to_string(),
            ..SocketIoConfig::new("https://bot.example.com")
        };
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "wss://bot.example.com/bot/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_url_rejects_garbage() {
        assert!(matches!(
            SocketIoConfig::new("not a url").socket_url(),
            Err(BackendError::InvalidUrl(_))
        ));
        assert!(matches!(
            SocketIoConfig::new("ftp://example.com").socket_url(),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn liveness_window_uses_handshake_or_fallback() {
        let mut handshake = Handshake {
            sid: "s".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
            max_payload: None,
        };
        assert_eq!(liveness_window(&handshake), Duration::from_secs(45));
        handshake.ping_interval = 0;
        handshake.ping_timeout = 0;
        assert_eq!(liveness_window(&handshake), FALLBACK_LIVENESS);
    }

    // ==================== Classification ====================

    fn driver() -> Driver {
        let (events, _) = mpsc::channel(1);
        let (_, outbound) = mpsc::channel(1);
        Driver {
            utterance_event: DEFAULT_UTTERANCE_EVENT.to_string(),
            user_message_event: DEFAULT_USER_MESSAGE_EVENT.to_string(),
            liveness: FALLBACK_LIVENESS,
            events,
            outbound,
            shutdown: CancellationToken::new(),
        }
    }

    #[test]
    fn classify_frames() {
        let driver = driver();
        assert_eq!(driver.classify("2"), Incoming::Ping(String::new()));
        assert_eq!(driver.classify("1"), Incoming::Closed);
        assert_eq!(driver.classify("41"), Incoming::Closed);
        assert_eq!(
            driver.classify(r#"42["bot_uttered",{"text":"Hi!"}]"#),
            Incoming::Utterance(Utterance::text("Hi!"))
        );
        assert_eq!(
            driver.classify(r#"42["session_confirm","abc"]"#),
            Incoming::Ignored
        );
        assert_eq!(
            driver.classify(r#"42/admin,["bot_uttered",{"text":"x"}]"#),
            Incoming::Ignored
        );
        assert_eq!(driver.classify(r#"42["bot_uttered","plain"]"#), Incoming::Ignored);
        assert_eq!(driver.classify("garbage"), Incoming::Ignored);
    }

    // ==================== Connection ====================

    #[tokio::test]
    async fn connect_exchanges_events_in_order() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let url = fake_backend(|mut ws| async move {
            accept_handshake(&mut ws).await;
            let forwarded = recv_text(&mut ws).await;
            send_text(&mut ws, r#"42["bot_uttered",{"text":"first"}]"#).await;
            send_text(&mut ws, r#"42["bot_uttered",{"text":"second","link":"http://x/1"}]"#).await;
            let _ = done_tx.send(forwarded);
        })
        .await;

        let mut link = connector(url).connect().await.unwrap();
        link.outbound.send(UserMessage::new("Hello")).await.unwrap();

        assert_eq!(link.events.recv().await, Some(Utterance::text("first")));
        let second = link.events.recv().await.unwrap();
        assert_eq!(second.text.as_deref(), Some("second"));
        assert_eq!(second.link.as_deref(), Some("http://x/1"));
        assert_eq!(
            done_rx.await.unwrap().as_deref(),
            Some(r#"42["user_uttered",{"message":"Hello"}]"#)
        );
    }

    #[tokio::test]
    async fn driver_answers_pings() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let url = fake_backend(|mut ws| async move {
            accept_handshake(&mut ws).await;
            send_text(&mut ws, "2").await;
            let _ = done_tx.send(recv_text(&mut ws).await);
        })
        .await;

        let _link = connector(url).connect().await.unwrap();
        assert_eq!(done_rx.await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn close_sends_disconnect_to_backend() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let url = fake_backend(|mut ws| async move {
            accept_handshake(&mut ws).await;
            let _ = done_tx.send(recv_text(&mut ws).await);
        })
        .await;

        let mut link = connector(url).connect().await.unwrap();
        link.close();
        link.close();

        assert_eq!(done_rx.await.unwrap().as_deref(), Some("41"));
        assert!(link.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn backend_disconnect_ends_event_stream() {
        let url = fake_backend(|mut ws| async move {
            accept_handshake(&mut ws).await;
            send_text(&mut ws, "41").await;
            // Keep the socket open; the packet alone must end the link.
            tokio::time::sleep(Duration::from_secs(1)).await;
        })
        .await;

        let mut link = connector(url).connect().await.unwrap();
        assert!(link.events.recv().await.is_none());
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn connect_refused_by_backend() {
        let url = fake_backend(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            let _ = recv_text(&mut ws).await;
            send_text(&mut ws, r#"44{"message":"Not authorized"}"#).await;
        })
        .await;

        let err = connector(url).connect().await.err().unwrap();
        assert!(matches!(err, BackendError::Handshake(_)));
        assert!(err.to_string().contains("Not authorized"));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connector(format!("http://{}/", addr))
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::Connect(_)));
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        let url = fake_backend(|ws| async move {
            // Accept the socket but never send the open packet
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(ws);
        })
        .await;

        let connector = SocketIoConnector::new(SocketIoConfig {
            connect_timeout: Duration::from_millis(200),
            ..SocketIoConfig::new(url)
        });
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}
