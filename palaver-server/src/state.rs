//! Shared application state for the palaver server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use palaver_core::{
    BackendConnector, CarouselEnricher, Enricher, GoogleWebTranslator, NoopEnricher,
    PassthroughTranslator, Pipeline, SocketIoConnector, Translator,
};
use tracing::info;

use crate::error::ServerError;
use crate::registry::SessionRegistry;
use crate::session::SessionContext;
use crate::RelayConfig;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live relay sessions
    pub registry: Arc<SessionRegistry>,
    /// Collaborators every new session is opened with
    pub sessions: SessionContext,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around an explicit connector and pipeline
    pub fn new(connector: Arc<dyn BackendConnector>, pipeline: Pipeline) -> Self {
        Self::with_context(SessionContext::new(connector, Arc::new(pipeline)))
    }

    pub fn with_context(sessions: SessionContext) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            sessions,
            started_at: Utc::now(),
        }
    }

    /// Build the production translator, enricher and backend connector
    pub fn from_config(config: &RelayConfig) -> Result<Self, ServerError> {
        let translator: Arc<dyn Translator> = if config.translator_enabled {
            Arc::new(GoogleWebTranslator::new(
                config.translator_endpoint.clone(),
                config.translate_timeout,
            )?)
        } else {
            info!("translation disabled, messages are relayed verbatim");
            Arc::new(PassthroughTranslator)
        };

        let enricher: Arc<dyn Enricher> = if config.enrichment_enabled {
            Arc::new(
                CarouselEnricher::new(config.enrich_timeout)?
                    .with_classes(config.container_class.clone(), config.image_class.clone()),
            )
        } else {
            info!("link enrichment disabled");
            Arc::new(NoopEnricher)
        };

        // Fail at startup on an unusable backend URL
        config
            .backend
            .socket_url()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let pipeline = Pipeline::new(translator, enricher)
            .with_working_language(config.working_language.clone())
            .with_translate_timeout(config.translate_timeout)
            .with_enrich_timeout(config.enrich_timeout);
        let connector: Arc<dyn BackendConnector> =
            Arc::new(SocketIoConnector::new(config.backend.clone()));

        let sessions = SessionContext::new(connector, Arc::new(pipeline))
            .with_default_language(config.default_language.clone());
        Ok(Self::with_context(sessions))
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
