use serde::{Deserialize, Serialize};

/// Default host for the palaver server
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default port for the palaver server
pub const DEFAULT_PORT: u16 = 8000;
/// Port the dialogue backend listens on when only its host is given
pub const DEFAULT_BACKEND_PORT: u16 = 5005;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPalaverConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub backend: RawBackendConfig,

    #[serde(default)]
    pub language: RawLanguageConfig,

    #[serde(default)]
    pub translator: RawTranslatorConfig,

    #[serde(default)]
    pub enrichment: RawEnrichmentConfig,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawBackendConfig {
    pub url: Option<String>,
    pub socketio_path: Option<String>,
    pub utterance_event: Option<String>,
    pub user_message_event: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawLanguageConfig {
    pub working: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTranslatorConfig {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawEnrichmentConfig {
    pub enabled: Option<bool>,
    pub container_class: Option<String>,
    pub image_class: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PalaverConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub language: LanguageConfig,

    #[serde(default)]
    pub translator: TranslatorConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the dialogue backend
    pub url: String,

    /// Socket.IO endpoint path on the backend host
    pub socketio_path: String,

    /// Event the backend emits utterances as
    pub utterance_event: String,

    /// Event user messages are emitted as
    pub user_message_event: String,

    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: palaver_core::backend::socketio::DEFAULT_BACKEND_URL.to_string(),
            socketio_path: palaver_core::backend::socketio::DEFAULT_SOCKETIO_PATH.to_string(),
            utterance_event: palaver_core::backend::socketio::DEFAULT_UTTERANCE_EVENT.to_string(),
            user_message_event: palaver_core::backend::socketio::DEFAULT_USER_MESSAGE_EVENT
                .to_string(),
            connect_timeout_secs: palaver_core::backend::socketio::DEFAULT_CONNECT_TIMEOUT
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language the backend understands
    pub working: String,

    /// Display language new sessions start with
    pub default: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            working: palaver_core::DEFAULT_WORKING_LANGUAGE.to_string(),
            default: palaver_server::DEFAULT_DISPLAY_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Translate between display and working language
    pub enabled: bool,

    pub endpoint: String,

    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: palaver_core::translate::DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            timeout_secs: palaver_core::pipeline::DEFAULT_TRANSLATE_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Attach carousel images to linked utterances
    pub enabled: bool,

    pub container_class: String,

    pub image_class: String,

    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container_class: palaver_core::enrich::DEFAULT_CONTAINER_CLASS.to_string(),
            image_class: palaver_core::enrich::DEFAULT_IMAGE_CLASS.to_string(),
            timeout_secs: palaver_core::pipeline::DEFAULT_ENRICH_TIMEOUT.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PalaverConfig::default();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.backend.url, "http://localhost:5005/");
        assert_eq!(config.backend.utterance_event, "bot_uttered");
        assert_eq!(config.backend.user_message_event, "user_uttered");
        assert_eq!(config.language.working, "en");
        assert_eq!(config.language.default, "en");
        assert!(config.translator.enabled);
        assert!(config.enrichment.enabled);
        assert_eq!(config.enrichment.container_class, "carrousel__viewport");
        assert_eq!(config.enrichment.image_class, "picture__image");
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = PalaverConfig::default();
        config.server.port = 9000;
        config.backend.url = "http://rasa:5005/".to_string();
        config.language.working = "es".to_string();
        config.translator.enabled = false;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PalaverConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.backend.url, "http://rasa:5005/");
        assert_eq!(parsed.language.working, "es");
        assert!(!parsed.translator.enabled);
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[server]
port = 9000

[enrichment]
enabled = false
"#;
        let raw: RawPalaverConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.server.port, Some(9000));
        assert!(raw.server.host.is_none());
        assert_eq!(raw.enrichment.enabled, Some(false));
        assert!(raw.enrichment.container_class.is_none());
        assert!(raw.backend.url.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawPalaverConfig = toml::from_str("").unwrap();

        assert!(raw.server.port.is_none());
        assert!(raw.language.working.is_none());
        assert!(raw.translator.enabled.is_none());
    }
}
