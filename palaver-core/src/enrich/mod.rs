//! Content enrichment
//!
//! An enricher turns a link carried by a backend utterance into the URL of
//! a representative image. Failures are never fatal to a session.

mod carousel;

use async_trait::async_trait;

use crate::error::EnrichError;

pub use carousel::{CarouselEnricher, DEFAULT_CONTAINER_CLASS, DEFAULT_IMAGE_CLASS, extract_image};

/// Stateless link enricher shared by every session
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fetch `link` and return the image URL found in it
    async fn image_for(&self, link: &str) -> Result<String, EnrichError>;
}

/// Enricher used when enrichment is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn image_for(&self, _link: &str) -> Result<String, EnrichError> {
        Err(EnrichError::MarkupNotFound)
    }
}
