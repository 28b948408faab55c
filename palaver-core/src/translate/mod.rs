//! Language translation
//!
//! Translation is best-effort: callers fall back to the original text on
//! any [`TranslateError`].

mod google;

use async_trait::async_trait;

use crate::error::TranslateError;

pub use google::{DEFAULT_TRANSLATE_ENDPOINT, GoogleWebTranslator};

/// Stateless text translator shared by every session
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from the `source` language into `target`
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError>;
}

/// Translator that returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(
        &self,
        text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, TranslateError> {
        Ok(text.to_string())
    }
}
