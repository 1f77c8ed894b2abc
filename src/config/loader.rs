use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use std::path::PathBuf;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the default search path.
    ///
    /// Sources, later ones winning:
    /// 1. ./config.toml
    /// 2. MEDCODEX_-prefixed environment variables
    pub fn load() -> Result<AppConfig, figment::Error> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::development(),
        ))
        .merge(Toml::file("config.toml"))
        .merge(Env::prefixed("MEDCODEX_").split("_").global());

        figment.extract()
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::development(),
        ))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDCODEX_").split("_").global());

        figment.extract()
    }

    /// Validate a loaded configuration
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.search.endpoint.is_empty() {
            return Err(ConfigValidationError::MissingSearchEndpoint);
        }

        if config.memory.max_context_tokens == 0 {
            return Err(ConfigValidationError::InvalidTokenBudget);
        }

        if config.embedding.backend == "http" && config.embedding.url.is_empty() {
            return Err(ConfigValidationError::MissingEmbeddingUrl);
        }

        Ok(())
    }
}

/// Configuration validation error
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("server port must be greater than 0")]
    InvalidPort,

    #[error("search endpoint is not configured")]
    MissingSearchEndpoint,

    #[error("context token budget must be greater than 0")]
    InvalidTokenBudget,

    #[error("http embedding backend selected but no url configured")]
    MissingEmbeddingUrl,
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

/// Check whether a configuration file exists
pub fn config_exists() -> bool {
    default_config_path().exists()
}
