//! Error types for palaver-core

use thiserror::Error;

/// Errors from the language translator
///
/// None of these reach the client: the pipeline falls back to the
/// untranslated text.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Translation service returned HTTP {0}")]
    Status(u16),

    #[error("Translation service returned no result")]
    EmptyResult,

    #[error("Translation timed out")]
    Timeout,
}

/// Errors from the content enricher
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Fetch failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Linked page returned HTTP {0}")]
    Status(u16),

    #[error("No carousel image in linked page")]
    MarkupNotFound,

    #[error("Enrichment timed out")]
    Timeout,
}

/// Errors from the dialogue backend connection
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect to backend: {0}")]
    Connect(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Backend handshake failed: {0}")]
    Handshake(String),

    #[error("Backend dial timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Backend connection closed")]
    Closed,

    #[error("Backend protocol error: {0}")]
    Protocol(#[from] PacketError),
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BackendError::Connect(Box::new(err))
    }
}

/// Errors decoding Engine.IO / Socket.IO packets
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown Engine.IO packet type: {0}")]
    UnknownEngineType(char),

    #[error("Unknown Socket.IO packet type: {0}")]
    UnknownSocketType(char),

    #[error("Malformed payload: {0}")]
    Payload(String),
}
