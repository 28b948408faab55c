//! Palaver serve command for running the relay server
//!
//! The serve command runs the palaver server which provides:
//! - A WebSocket endpoint relaying each client to its own backend session
//! - A health endpoint and a small landing page

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use palaver_core::SocketIoConfig;
use palaver_server::{PalaverServer, RelayConfig, ServerConfig};
use tracing::info;

use crate::config::{ConfigLoader, PalaverConfig};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Base URL of the dialogue backend (overrides config and environment)
    #[arg(long)]
    pub backend_url: Option<String>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = apply_args(ConfigLoader::load()?, &args);
    let (server_config, relay) = build_configs(&config);

    info!(
        backend = %relay.backend.url,
        working_language = %relay.working_language,
        "Starting palaver server on {}",
        server_config.addr()
    );

    let server = PalaverServer::new(server_config, &relay)?;
    server.run().await.map_err(Into::into)
}

/// Command line flags are the last layer
fn apply_args(mut config: PalaverConfig, args: &ServeArgs) -> PalaverConfig {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(url) = &args.backend_url {
        config.backend.url = url.clone();
    }
    config
}

fn build_configs(config: &PalaverConfig) -> (ServerConfig, RelayConfig) {
    let server = ServerConfig::new(config.server.host.clone(), config.server.port);

    let backend = SocketIoConfig {
        url: config.backend.url.clone(),
        socketio_path: config.backend.socketio_path.clone(),
        utterance_event: config.backend.utterance_event.clone(),
        user_message_event: config.backend.user_message_event.clone(),
        connect_timeout: Duration::from_secs(config.backend.connect_timeout_secs),
    };

    let relay = RelayConfig {
        backend,
        working_language: config.language.working.clone(),
        default_language: config.language.default.clone(),
        translator_enabled: config.translator.enabled,
        translator_endpoint: config.translator.endpoint.clone(),
        translate_timeout: Duration::from_secs(config.translator.timeout_secs),
        enrichment_enabled: config.enrichment.enabled,
        container_class: config.enrichment.container_class.clone(),
        image_class: config.enrichment.image_class.clone(),
        enrich_timeout: Duration::from_secs(config.enrichment.timeout_secs),
    };

    (server, relay)
}
