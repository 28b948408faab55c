use super::types::{
    BackendConfig, DEFAULT_BACKEND_PORT, DEFAULT_HOST, DEFAULT_PORT, EnrichmentConfig,
    LanguageConfig, PalaverConfig, RawBackendConfig, RawEnrichmentConfig, RawLanguageConfig,
    RawPalaverConfig, RawServerConfig, RawTranslatorConfig, ServerConfig, TranslatorConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Host of the dialogue backend; the URL is built as `http://{host}:5005/`
pub const BACKEND_HOST_ENV: &str = "PALAVER_BACKEND_HOST";
/// Full base URL of the dialogue backend, wins over the host variable
pub const BACKEND_URL_ENV: &str = "PALAVER_BACKEND_URL";
/// Directory holding the project config file
pub const PROJECT_CONFIG_DIR_ENV: &str = "PALAVER_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<PalaverConfig> {
        let project_path = Self::project_config_path();
        Self::load_layers(
            Self::user_config_path().as_deref(),
            &project_path,
            |key| std::env::var(key).ok(),
        )
    }

    /// Load from explicit file locations and an environment lookup
    pub fn load_layers(
        user_path: Option<&Path>,
        project_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<PalaverConfig> {
        let mut raw = RawPalaverConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project_path)?);
        }

        // Layer 3: Environment
        raw = Self::apply_env(raw, env);

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<RawPalaverConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "palaver").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with PALAVER_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".palaver/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawPalaverConfig, overlay: RawPalaverConfig) -> RawPalaverConfig {
        RawPalaverConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            backend: RawBackendConfig {
                url: overlay.backend.url.or(base.backend.url),
                socketio_path: overlay.backend.socketio_path.or(base.backend.socketio_path),
                utterance_event: overlay
                    .backend
                    .utterance_event
                    .or(base.backend.utterance_event),
                user_message_event: overlay
                    .backend
                    .user_message_event
                    .or(base.backend.user_message_event),
                connect_timeout_secs: overlay
                    .backend
                    .connect_timeout_secs
                    .or(base.backend.connect_timeout_secs),
            },
            language: RawLanguageConfig {
                working: overlay.language.working.or(base.language.working),
                default: overlay.language.default.or(base.language.default),
            },
            translator: RawTranslatorConfig {
                enabled: overlay.translator.enabled.or(base.translator.enabled),
                endpoint: overlay.translator.endpoint.or(base.translator.endpoint),
                timeout_secs: overlay.translator.timeout_secs.or(base.translator.timeout_secs),
            },
            enrichment: RawEnrichmentConfig {
                enabled: overlay.enrichment.enabled.or(base.enrichment.enabled),
                container_class: overlay
                    .enrichment
                    .container_class
                    .or(base.enrichment.container_class),
                image_class: overlay.enrichment.image_class.or(base.enrichment.image_class),
                timeout_secs: overlay.enrichment.timeout_secs.or(base.enrichment.timeout_secs),
            },
        }
    }

    /// Apply backend location overrides from the environment
    fn apply_env(mut raw: RawPalaverConfig, env: impl Fn(&str) -> Option<String>) -> RawPalaverConfig {
        let non_empty = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(BACKEND_URL_ENV) {
            raw.backend.url = Some(url);
        } else if let Some(host) = non_empty(BACKEND_HOST_ENV) {
            raw.backend.url = Some(format!("http://{}:{}/", host.trim(), DEFAULT_BACKEND_PORT));
        }
        raw
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawPalaverConfig) -> PalaverConfig {
        let backend = BackendConfig::default();
        let language = LanguageConfig::default();
        let translator = TranslatorConfig::default();
        let enrichment = EnrichmentConfig::default();

        PalaverConfig {
            server: ServerConfig {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
            },
            backend: BackendConfig {
                url: raw.backend.url.unwrap_or(backend.url),
                socketio_path: raw.backend.socketio_path.unwrap_or(backend.socketio_path),
                utterance_event: raw.backend.utterance_event.unwrap_or(backend.utterance_event),
                user_message_event: raw
                    .backend
                    .user_message_event
                    .unwrap_or(backend.user_message_event),
                connect_timeout_secs: raw
                    .backend
                    .connect_timeout_secs
                    .unwrap_or(backend.connect_timeout_secs),
            },
            language: LanguageConfig {
                working: raw.language.working.unwrap_or(language.working),
                default: raw.language.default.unwrap_or(language.default),
            },
            translator: TranslatorConfig {
                enabled: raw.translator.enabled.unwrap_or(translator.enabled),
                endpoint: raw.translator.endpoint.unwrap_or(translator.endpoint),
                timeout_secs: raw.translator.timeout_secs.unwrap_or(translator.timeout_secs),
            },
            enrichment: EnrichmentConfig {
                enabled: raw.enrichment.enabled.unwrap_or(enrichment.enabled),
                container_class: raw
                    .enrichment
                    .container_class
                    .unwrap_or(enrichment.container_class),
                image_class: raw.enrichment.image_class.unwrap_or(enrichment.image_class),
                timeout_secs: raw.enrichment.timeout_secs.unwrap_or(enrichment.timeout_secs),
            },
        }
    }
}
