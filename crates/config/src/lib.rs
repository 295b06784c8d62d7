//! Layered configuration: process-wide `Settings` loaded from
//! `config/default.yaml` → `config/{env}.yaml` → `ORCHESTRATOR__`-prefixed
//! environment variables, plus the per-mode committee/deadline schema
//! loaded from the path a vote request names.

pub mod modes;
pub mod settings;

pub use modes::{load_mode_config, ModesFile};
pub use settings::{
    load_settings, CacheConfig, HeavyGateConfig, ObservabilityConfig, RagConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("unknown mode: {0}")]
    UnknownMode(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for orchestrator_core::Error {
    fn from(err: ConfigError) -> Self {
        orchestrator_core::Error::Config(err.to_string())
    }
}
