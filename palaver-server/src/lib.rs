//! palaver-server - HTTP and WebSocket front of the palaver relay
//!
//! Each browser client connecting to `/ws` gets its own relay session: a
//! dedicated connection to the dialogue backend, a display language, and
//! the translation and enrichment pipeline from `palaver-core` applied in
//! both directions. The server also serves a small landing page and a
//! health endpoint.

mod error;
pub mod http;
mod registry;
mod session;
mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use palaver_core::SocketIoConfig;
use palaver_core::enrich::{DEFAULT_CONTAINER_CLASS, DEFAULT_IMAGE_CLASS};
use palaver_core::pipeline::{DEFAULT_ENRICH_TIMEOUT, DEFAULT_TRANSLATE_TIMEOUT};
use palaver_core::translate::DEFAULT_TRANSLATE_ENDPOINT;
use tokio::net::TcpListener;

pub use error::{ServerError, SessionError};
pub use http::create_router;
pub use registry::SessionRegistry;
pub use session::{
    ClientWriter, DEFAULT_DISPLAY_LANGUAGE, Session, SessionContext, SessionHandle, SessionId,
    Termination,
};
pub use state::AppState;

/// The palaver relay server
pub struct PalaverServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl PalaverServer {
    /// Create a server whose relay components are built from `relay`
    pub fn new(config: ServerConfig, relay: &RelayConfig) -> Result<Self, ServerError> {
        Ok(Self {
            config,
            state: Arc::new(AppState::from_config(relay)?),
        })
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server until Ctrl-C, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("palaver server listening on {}", addr);

        let shutdown = self.state.sessions.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received, closing sessions");
                shutdown.cancel();
            }
        });

        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let shutdown = self.state.sessions.shutdown.clone();
        let state = Arc::clone(&self.state);
        let router = create_router(self.state);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            state.registry.close_all().await;
        })
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        tracing::info!("palaver server stopped");
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:8000")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for the relay pipeline and the backend connection
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub backend: SocketIoConfig,
    /// Language the backend speaks
    pub working_language: String,
    /// Display language a new session starts with
    pub default_language: String,
    pub translator_enabled: bool,
    pub translator_endpoint: String,
    pub translate_timeout: Duration,
    pub enrichment_enabled: bool,
    pub container_class: String,
    pub image_class: String,
    pub enrich_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: SocketIoConfig::default(),
            working_language: palaver_core::DEFAULT_WORKING_LANGUAGE.to_string(),
            default_language: DEFAULT_DISPLAY_LANGUAGE.to_string(),
            translator_enabled: true,
            translator_endpoint: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            translate_timeout: DEFAULT_TRANSLATE_TIMEOUT,
            enrichment_enabled: true,
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            image_class: DEFAULT_IMAGE_CLASS.to_string(),
            enrich_timeout: DEFAULT_ENRICH_TIMEOUT,
        }
    }
}
