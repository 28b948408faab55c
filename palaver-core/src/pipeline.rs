//! Per-message translation and enrichment rules
//!
//! The pipeline holds no per-session state: the caller passes the session's
//! current display language with every message.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::enrich::Enricher;
use crate::error::{EnrichError, TranslateError};
use crate::message::{OutboundMessage, UserMessage, Utterance};
use crate::translate::Translator;

/// Language the dialogue backend is trained on
pub const DEFAULT_WORKING_LANGUAGE: &str = "en";

/// Default upper bound for one enrichment fetch
pub const DEFAULT_ENRICH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound for one translation call
pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Translation and enrichment applied between a client and the backend
pub struct Pipeline {
    translator: Arc<dyn Translator>,
    enricher: Arc<dyn Enricher>,
    working_language: String,
    translate_timeout: Duration,
    enrich_timeout: Duration,
}

impl Pipeline {
    pub fn new(translator: Arc<dyn Translator>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            translator,
            enricher,
            working_language: DEFAULT_WORKING_LANGUAGE.to_string(),
            translate_timeout: DEFAULT_TRANSLATE_TIMEOUT,
            enrich_timeout: DEFAULT_ENRICH_TIMEOUT,
        }
    }

    pub fn with_working_language(mut self, language: impl Into<String>) -> Self {
        self.working_language = language.into();
        self
    }

    pub fn with_translate_timeout(mut self, timeout: Duration) -> Self {
        self.translate_timeout = timeout;
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }

    pub fn working_language(&self) -> &str {
        &self.working_language
    }

    /// Build the backend payload for text typed in `display_language`
    ///
    /// The text is forwarded byte-for-byte when no translation is needed
    /// or when the translator fails.
    pub async fn to_backend(&self, display_language: &str, text: &str) -> UserMessage {
        if display_language == self.working_language {
            return UserMessage::new(text);
        }

        let message = self
            .translate_or_original(text, display_language, &self.working_language)
            .await;
        UserMessage::new(message)
    }

    /// Build the client frame for a backend utterance
    ///
    /// `text` and `title` are translated independently. When the utterance
    /// carries a link the enricher is awaited before returning, so frames
    /// leave in the same order as the utterances arrived.
    pub async fn to_client(&self, display_language: &str, utterance: Utterance) -> OutboundMessage {
        let Utterance { text, title, link } = utterance;

        let (text, title) = if display_language == self.working_language {
            (text, title)
        } else {
            let source = self.working_language.as_str();
            tokio::join!(
                self.translate_field(text, source, display_language),
                self.translate_field(title, source, display_language),
            )
        };

        let image = match &link {
            Some(link) => self.enrich(link).await,
            None => None,
        };

        OutboundMessage {
            text,
            title,
            link,
            image,
        }
    }

    async fn translate_field(
        &self,
        field: Option<String>,
        source: &str,
        target: &str,
    ) -> Option<String> {
        match field {
            Some(value) => Some(self.translate_or_original(&value, source, target).await),
            None => None,
        }
    }

    async fn translate_or_original(&self, text: &str, source: &str, target: &str) -> String {
        let result = tokio::time::timeout(
            self.translate_timeout,
            self.translator.translate(text, source, target),
        )
        .await
        .unwrap_or(Err(TranslateError::Timeout));

        match result {
            Ok(translated) => translated,
            Err(e) => {
                warn!(source, target, "translation failed, forwarding original: {}", e);
                text.to_string()
            }
        }
    }

    async fn enrich(&self, link: &str) -> Option<String> {
        let result = tokio::time::timeout(self.enrich_timeout, self.enricher.image_for(link))
            .await
            .unwrap_or(Err(EnrichError::Timeout));

        match result {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(link, "no image for link: {}", e);
                None
            }
        }
    }
}
