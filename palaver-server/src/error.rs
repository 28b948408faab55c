//! Server error types

use palaver_core::{BackendError, EnrichError, TranslateError};
use thiserror::Error;

/// Errors that can occur in the palaver server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Relay components could not be built from the configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TranslateError> for ServerError {
    fn from(err: TranslateError) -> Self {
        ServerError::Config(format!("translator: {}", err))
    }
}

impl From<EnrichError> for ServerError {
    fn from(err: EnrichError) -> Self {
        ServerError::Config(format!("enricher: {}", err))
    }
}

/// Errors that end a relay session or prevent it from opening
#[derive(Debug, Error)]
pub enum SessionError {
    /// Writing to or reading from the client socket failed
    #[error("client connection failed: {0}")]
    Client(String),

    /// The client socket was already closed by this side
    #[error("client connection already closed")]
    ClientClosed,

    /// The client went away before the backend dial finished
    #[error("client disconnected during backend dial")]
    ClientLeft,

    /// The backend could not be reached
    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    /// A frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
