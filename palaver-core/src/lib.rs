//! palaver-core: Core library for the palaver session relay
//!
//! This crate holds everything a relay session needs that is not tied to
//! the client-facing socket:
//!
//! - **Messages** - [`InboundMessage`], [`OutboundMessage`], [`Utterance`] and
//!   [`UserMessage`], the JSON frames exchanged with clients and the backend
//! - **Translation** - the [`Translator`] trait and [`GoogleWebTranslator`]
//! - **Enrichment** - the [`Enricher`] trait and [`CarouselEnricher`]
//! - **Pipeline** - [`Pipeline`], the best-effort translation and enrichment
//!   rules applied in each direction
//! - **Backend** - [`BackendConnector`] and [`SocketIoConnector`], which
//!   expose a dialogue backend connection as a [`BackendLink`]
//!
//! # Architecture
//!
//! ```text
//! client frame ──► Pipeline::to_backend ──► BackendLink.outbound ──► backend
//! client frame ◄── Pipeline::to_client  ◄── BackendLink.events   ◄── backend
//!                        │
//!                 Translator / Enricher
//! ```

pub mod backend;
pub mod enrich;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod translate;

// Re-export key types for convenience
pub use backend::{
    BackendConnector, BackendLink, BackendPeer, MemoryConnector, SocketIoConfig,
    SocketIoConnector,
};
pub use enrich::{CarouselEnricher, Enricher, NoopEnricher};
pub use error::{BackendError, EnrichError, PacketError, TranslateError};
pub use message::{InboundMessage, OutboundMessage, StatusMessage, UserMessage, Utterance};
pub use pipeline::{DEFAULT_WORKING_LANGUAGE, Pipeline};
pub use translate::{GoogleWebTranslator, PassthroughTranslator, Translator};
