//! Translator backed by the Google Translate mobile web page

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use super::Translator;
use crate::error::TranslateError;

/// Public mobile translation page
pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://translate.google.com/m";

/// The mobile page only renders the plain result for legacy browsers
const USER_AGENT: &str = "Mozilla/4.0 (compatible;MSIE 6.0;Windows NT 5.1;SV1;.NET CLR 1.1.4322;.NET CLR 2.0.50727;.NET CLR 3.0.04506.30)";

/// Result element on the current page, then the legacy one
const RESULT_SELECTOR: &str = "div.result-container, div.t0";

/// Translates by requesting `{endpoint}?sl=..&tl=..&q=..` and scraping
/// the result element out of the returned page.
#[derive(Debug, Clone)]
pub struct GoogleWebTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleWebTranslator {
    /// Create a translator for `endpoint`; each request is bounded by `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Translator for GoogleWebTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        if source == target || text.is_empty() {
            return Ok(text.to_string());
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("sl", source), ("tl", target), ("q", text)])
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_request_error)?;
        let translated = extract_translation(&body).ok_or(TranslateError::EmptyResult)?;
        debug!(source, target, "translated {} chars", text.len());
        Ok(translated)
    }
}

fn map_request_error(err: reqwest::Error) -> TranslateError {
    if err.is_timeout() {
        TranslateError::Timeout
    } else {
        TranslateError::Request(err)
    }
}

/// Pull the translated text out of the result page
fn extract_translation(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RESULT_SELECTOR).ok()?;
    let element = document.select(&selector).next()?;
    let text = element.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}
