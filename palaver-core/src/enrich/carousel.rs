//! Image extraction from listing pages with a picture carousel

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::Enricher;
use crate::error::EnrichError;

/// Class of the carousel container element
pub const DEFAULT_CONTAINER_CLASS: &str = "carrousel__viewport";
/// Class of the image element nested in the container
pub const DEFAULT_IMAGE_CLASS: &str = "picture__image";

/// Fetches a page and takes the `src` of the first carousel picture
#[derive(Debug, Clone)]
pub struct CarouselEnricher {
    client: reqwest::Client,
    container_class: String,
    image_class: String,
}

impl CarouselEnricher {
    /// Create an enricher whose fetches are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            image_class: DEFAULT_IMAGE_CLASS.to_string(),
        })
    }

    /// Override the container and image class markers
    pub fn with_classes(
        mut self,
        container_class: impl Into<String>,
        image_class: impl Into<String>,
    ) -> Self {
        self.container_class = container_class.into();
        self.image_class = image_class.into();
        self
    }
}

#[async_trait]
impl Enricher for CarouselEnricher {
    async fn image_for(&self, link: &str) -> Result<String, EnrichError> {
        let url = url::Url::parse(link).map_err(|e| EnrichError::InvalidLink(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_request_error)?;
        extract_image(&body, &self.container_class, &self.image_class)
            .ok_or(EnrichError::MarkupNotFound)
    }
}

fn map_request_error(err: reqwest::Error) -> EnrichError {
    if err.is_timeout() {
        EnrichError::Timeout
    } else {
        EnrichError::Request(err)
    }
}

/// Find the first `.{container_class}` element and return the `src` of the
/// first `.{image_class}` element inside it.
///
/// Returns `None` on any structural mismatch: no container, no image in the
/// container, missing or blank `src`, or class names that do not form a
/// valid selector.
pub fn extract_image(html: &str, container_class: &str, image_class: &str) -> Option<String> {
    let container_selector = Selector::parse(&format!(".{}", container_class)).ok()?;
    let image_selector = Selector::parse(&format!(".{}", image_class)).ok()?;

    let document = Html::parse_document(html);
    let container = document.select(&container_selector).next()?;
    let image = container.select(&image_selector).next()?;
    let src = image.value().attr("src")?.trim();

    (!src.is_empty()).then(|| src.to_string())
}
